//! Corporate dashboard endpoints.

use serde_json::Value;

use super::client::{ApiClient, ApiError};

/// `/corporate` dashboard endpoints.
#[derive(Debug, Clone, Copy)]
pub struct DashboardApi<'a> {
    client: &'a ApiClient,
}

impl<'a> DashboardApi<'a> {
    pub(crate) const fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Bed-space utilization across hospitals.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn bedspace_utilization(&self) -> Result<Value, ApiError> {
        self.client.get(&["corporate", "bed-space-utilization"], &[]).await
    }

    /// Occupancy rates.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn occupancy_rates(&self) -> Result<Value, ApiError> {
        self.client.get(&["corporate", "occupancy-rates"], &[]).await
    }

    /// Admission trends.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn admission_trends(&self) -> Result<Value, ApiError> {
        self.client.get(&["corporate", "admission-trends"], &[]).await
    }

    /// Bed turnover rates.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn turnover_rates(&self) -> Result<Value, ApiError> {
        self.client.get(&["corporate", "turnover-rates"], &[]).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn reads_each_report() {
        let server = MockServer::start().await;
        for (route, value) in [
            ("bed-space-utilization", 71),
            ("occupancy-rates", 64),
            ("admission-trends", 12),
            ("turnover-rates", 3),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/api/v1/corporate/{route}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = ApiClient::new(server.uri());
        let dashboard = client.dashboard();
        assert_eq!(dashboard.bedspace_utilization().await.unwrap()["value"], 71);
        assert_eq!(dashboard.occupancy_rates().await.unwrap()["value"], 64);
        assert_eq!(dashboard.admission_trends().await.unwrap()["value"], 12);
        assert_eq!(dashboard.turnover_rates().await.unwrap()["value"], 3);
    }
}
