//! Emergency alert endpoints.

use chrono::NaiveDate;
use serde_json::{Value, json};

use super::client::{ApiClient, ApiError, query_params};

/// `/emergency-alerts` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct AlertsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AlertsApi<'a> {
    pub(crate) const fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Raise an alert.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn create(&self, alert: &Value) -> Result<Value, ApiError> {
        self.client.post(&["emergency-alerts"], alert).await
    }

    /// List alerts, optionally by hospital and status.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_all(
        &self,
        hospital_id: Option<&str>,
        status: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = query_params([("hospitalId", hospital_id), ("status", status)]);
        self.client.get(&["emergency-alerts"], &query).await
    }

    /// Fetch one alert.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_one(&self, id: &str) -> Result<Value, ApiError> {
        self.client.get(&["emergency-alerts", id], &[]).await
    }

    /// Partially update an alert.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn update(&self, id: &str, changes: &Value) -> Result<Value, ApiError> {
        self.client
            .patch(&["emergency-alerts", id], changes)
            .await
    }

    /// Delete an alert.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn remove(&self, id: &str) -> Result<Value, ApiError> {
        self.client.delete(&["emergency-alerts", id]).await
    }

    /// Mark an alert resolved.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn resolve(&self, id: &str, resolved_by: &str) -> Result<Value, ApiError> {
        self.client
            .put_query(
                &["emergency-alerts", id, "resolve"],
                &[("resolvedBy", resolved_by.to_string())],
            )
            .await
    }

    /// Number of active alerts for a hospital.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn active_count(&self, hospital_id: &str) -> Result<Value, ApiError> {
        self.client
            .get(&["emergency-alerts", "count", hospital_id], &[])
            .await
    }

    /// Alerts grouped by type, optionally within a date range.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn by_type(
        &self,
        hospital_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Value, ApiError> {
        let start = start.map(|d| d.format("%Y-%m-%d").to_string());
        let end = end.map(|d| d.format("%Y-%m-%d").to_string());
        let query = query_params([
            ("startDate", start.as_deref()),
            ("endDate", end.as_deref()),
        ]);
        self.client
            .get(&["emergency-alerts", "by-type", hospital_id], &query)
            .await
    }
}

/// Body for a new alert.
#[must_use]
pub fn alert_body(hospital_id: &str, alert_type: &str, description: &str) -> Value {
    json!({
        "hospitalId": hospital_id,
        "type": alert_type,
        "description": description,
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn find_all_omits_missing_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/emergency-alerts"))
            .and(query_param("status", "active"))
            .and(query_param_is_missing("hospitalId"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let list = client.alerts().find_all(None, Some("active")).await.unwrap();
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn by_type_formats_dates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/emergency-alerts/by-type/h-1"))
            .and(query_param("startDate", "2024-03-01"))
            .and(query_param("endDate", "2024-03-31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"fire": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let grouped = client
            .alerts()
            .by_type(
                "h-1",
                NaiveDate::from_ymd_opt(2024, 3, 1),
                NaiveDate::from_ymd_opt(2024, 3, 31),
            )
            .await
            .unwrap();
        assert_eq!(grouped["fire"], 2);
    }

    #[tokio::test]
    async fn resolve_and_update_use_expected_verbs() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/emergency-alerts/a-1/resolve"))
            .and(query_param("resolvedBy", "dr-who"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "resolved"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/emergency-alerts/a-1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "db down"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let resolved = client.alerts().resolve("a-1", "dr-who").await.unwrap();
        assert_eq!(resolved["status"], "resolved");
        assert_eq!(
            client.alerts().update("a-1", &json!({"priority": "high"})).await,
            Err(ApiError::Server {
                status: 500,
                message: "db down".to_string()
            })
        );
    }
}
