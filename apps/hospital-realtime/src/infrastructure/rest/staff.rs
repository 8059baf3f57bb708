//! Staff endpoints.

use serde_json::{Value, json};

use super::client::{ApiClient, ApiError, query_params};

/// Filters for [`StaffApi::find_all`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffFilter<'f> {
    /// Owning hospital.
    pub hospital_id: Option<&'f str>,
    /// Department name.
    pub department: Option<&'f str>,
    /// Availability state.
    pub availability: Option<&'f str>,
}

/// `/staff` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct StaffApi<'a> {
    client: &'a ApiClient,
}

impl<'a> StaffApi<'a> {
    pub(crate) const fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Add a staff member.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn create(&self, member: &Value) -> Result<Value, ApiError> {
        self.client.post(&["staff"], member).await
    }

    /// List staff matching `filter`.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_all(&self, filter: StaffFilter<'_>) -> Result<Value, ApiError> {
        let query = query_params([
            ("hospitalId", filter.hospital_id),
            ("department", filter.department),
            ("availability", filter.availability),
        ]);
        self.client.get(&["staff"], &query).await
    }

    /// Fetch one staff member.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_one(&self, id: &str) -> Result<Value, ApiError> {
        self.client.get(&["staff", id], &[]).await
    }

    /// Replace a staff member.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn update(&self, id: &str, member: &Value) -> Result<Value, ApiError> {
        self.client.put(&["staff", id], member).await
    }

    /// Remove a staff member.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn remove(&self, id: &str) -> Result<Value, ApiError> {
        self.client.delete(&["staff", id]).await
    }

    /// Set a staff member's availability.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn update_availability(
        &self,
        id: &str,
        availability: &str,
    ) -> Result<Value, ApiError> {
        self.client
            .put(
                &["staff", id, "availability"],
                &json!({ "availability": availability }),
            )
            .await
    }

    /// Staffing summary for a hospital.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn summary(&self, hospital_id: &str) -> Result<Value, ApiError> {
        self.client
            .get(&["staff", "hospital", hospital_id, "summary"], &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::infrastructure::gateway::AuthToken;

    #[tokio::test]
    async fn find_all_sends_every_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/staff"))
            .and(query_param("hospitalId", "h-1"))
            .and(query_param("department", "ER"))
            .and(query_param("availability", "on-duty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "s-1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let staff = client
            .staff()
            .find_all(StaffFilter {
                hospital_id: Some("h-1"),
                department: Some("ER"),
                availability: Some("on-duty"),
            })
            .await
            .unwrap();
        assert_eq!(staff[0]["_id"], "s-1");
    }

    #[tokio::test]
    async fn availability_is_a_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/staff/s-1/availability"))
            .and(body_json(json!({"availability": "off-duty"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let body = client
            .staff()
            .update_availability("s-1", "off-duty")
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/staff/hospital/h-1/summary"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).with_token(AuthToken::new("stale"));
        assert_eq!(
            client.staff().summary("h-1").await,
            Err(ApiError::Unauthorized {
                message: "jwt expired".to_string()
            })
        );
    }
}
