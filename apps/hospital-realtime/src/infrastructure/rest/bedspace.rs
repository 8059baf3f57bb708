//! Bed-space endpoints.

use serde_json::{Value, json};

use super::client::{ApiClient, ApiError, query_params};

/// Patient movement applied to a bed-space's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedAction {
    /// One bed taken.
    Admit,
    /// One bed freed.
    Discharge,
}

impl BedAction {
    /// Query value for the action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::Discharge => "discharge",
        }
    }
}

/// `/bedspaces` endpoints.
#[derive(Debug, Clone, Copy)]
pub struct BedspaceApi<'a> {
    client: &'a ApiClient,
}

impl<'a> BedspaceApi<'a> {
    pub(crate) const fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Create a bed-space.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn create(&self, bedspace: &Value) -> Result<Value, ApiError> {
        self.client.post(&["bedspaces"], bedspace).await
    }

    /// List bed-spaces, optionally for one hospital.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_all(&self, hospital_id: Option<&str>) -> Result<Value, ApiError> {
        self.client
            .get(&["bedspaces"], &query_params([("hospitalId", hospital_id)]))
            .await
    }

    /// Fetch one bed-space.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn find_one(&self, id: &str) -> Result<Value, ApiError> {
        self.client.get(&["bedspaces", id], &[]).await
    }

    /// Replace a bed-space.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn update(&self, id: &str, bedspace: &Value) -> Result<Value, ApiError> {
        self.client.put(&["bedspaces", id], bedspace).await
    }

    /// Delete a bed-space.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn remove(&self, id: &str) -> Result<Value, ApiError> {
        self.client.delete(&["bedspaces", id]).await
    }

    /// Capacity summary for a hospital.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn hospital_summary(&self, hospital_id: &str) -> Result<Value, ApiError> {
        self.client
            .get(&["bedspaces", "hospital", hospital_id, "summary"], &[])
            .await
    }

    /// Admit or discharge one patient.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    pub async fn update_availability(
        &self,
        id: &str,
        action: BedAction,
    ) -> Result<Value, ApiError> {
        self.client
            .put_query(
                &["bedspaces", id, "availability"],
                &[("action", action.as_str().to_string())],
            )
            .await
    }
}

/// Body for a minimal bed-space record.
#[must_use]
pub fn bedspace_body(hospital_id: &str, department: &str, total_beds: u32) -> Value {
    json!({
        "hospital": hospital_id,
        "department": department,
        "totalBeds": total_beds,
        "availableBeds": total_beds,
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn find_all_filters_by_hospital() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bedspaces"))
            .and(query_param("hospitalId", "h-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "b-1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let list = client.bedspaces().find_all(Some("h-1")).await.unwrap();
        assert_eq!(list[0]["_id"], "b-1");
    }

    #[tokio::test]
    async fn ids_with_reserved_characters_stay_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/bedspaces/ICU%2F2%20east"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        assert_eq!(
            client.bedspaces().remove("ICU/2 east").await,
            Ok(Value::Null)
        );
    }

    #[tokio::test]
    async fn availability_sends_action() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/bedspaces/b-1/availability"))
            .and(query_param("action", "discharge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"availableBeds": 4})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        let body = client
            .bedspaces()
            .update_availability("b-1", BedAction::Discharge)
            .await
            .unwrap();
        assert_eq!(body["availableBeds"], 4);
    }

    #[tokio::test]
    async fn create_posts_body_and_maps_conflict() {
        let server = MockServer::start().await;
        let body = bedspace_body("h-1", "ICU", 10);
        Mock::given(method("POST"))
            .and(path("/api/v1/bedspaces"))
            .and(body_json(&body))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({"message": "ICU already exists"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        assert_eq!(
            client.bedspaces().create(&body).await,
            Err(ApiError::Client {
                status: 409,
                message: "ICU already exists".to_string()
            })
        );
    }
}
