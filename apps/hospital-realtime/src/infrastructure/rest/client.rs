//! HTTP client for the hospital REST API.

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;

use super::{AlertsApi, BedspaceApi, DashboardApi, StaffApi};
use crate::infrastructure::gateway::AuthToken;

const API_PREFIX: &str = "/api/v1";
const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// Errors returned by [`ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received.
    #[error("network error: {0}")]
    Network(String),
    /// 401 from the API.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server message.
        message: String,
    },
    /// Any other 4xx.
    #[error("request rejected ({status}): {message}")]
    Client {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },
    /// 5xx.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },
    /// Response body was not the expected JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// Base URL cannot carry a path.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Map a non-success response to an error, reading the message from
    /// `message`, then `error`.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                ["message", "error"].iter().find_map(|key| {
                    v.get(*key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                })
            })
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

        let code = status.as_u16();
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized { message },
            s if s.is_server_error() => Self::Server {
                status: code,
                message,
            },
            _ => Self::Client {
                status: code,
                message,
            },
        }
    }
}

/// JSON client for `<base>/api/v1`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<AuthToken>,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url` (without `/api/v1`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: format!("{}{API_PREFIX}", base_url.trim_end_matches('/')),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` on every request. Anonymous
    /// tokens are not sent.
    #[must_use]
    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = (!token.is_anonymous()).then_some(token);
        self
    }

    /// Resolved API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bed-space endpoints.
    #[must_use]
    pub const fn bedspaces(&self) -> BedspaceApi<'_> {
        BedspaceApi::new(self)
    }

    /// Emergency alert endpoints.
    #[must_use]
    pub const fn alerts(&self) -> AlertsApi<'_> {
        AlertsApi::new(self)
    }

    /// Staff endpoints.
    #[must_use]
    pub const fn staff(&self) -> StaffApi<'_> {
        StaffApi::new(self)
    }

    /// Corporate dashboard endpoints.
    #[must_use]
    pub const fn dashboard(&self) -> DashboardApi<'_> {
        DashboardApi::new(self)
    }

    /// API root plus `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let builder = self.client.request(method, self.url(segments)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        })
    }

    pub(crate) async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, segments)?.query(query))
            .await
    }

    pub(crate) async fn post<B>(&self, segments: &[&str], body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(Method::POST, segments)?.json(body))
            .await
    }

    pub(crate) async fn put<B>(&self, segments: &[&str], body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(Method::PUT, segments)?.json(body))
            .await
    }

    pub(crate) async fn put_query(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::PUT, segments)?.query(query))
            .await
    }

    pub(crate) async fn patch<B>(&self, segments: &[&str], body: &B) -> Result<Value, ApiError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.send(self.request(Method::PATCH, segments)?.json(body))
            .await
    }

    pub(crate) async fn delete(&self, segments: &[&str]) -> Result<Value, ApiError> {
        self.send(self.request(Method::DELETE, segments)?).await
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let url = response.url().path().to_string();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            let error = ApiError::from_response(status, &text);
            tracing::warn!(
                path = %url,
                status = status.as_u16(),
                error = %error,
                "API request failed"
            );
            return Err(error);
        }

        tracing::debug!(path = %url, status = status.as_u16(), "API request succeeded");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Collect present optional query parameters.
pub(crate) fn query_params<const N: usize>(
    params: [(&'static str, Option<&str>); N],
) -> Vec<(&'static str, String)> {
    params
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn base_url_gets_api_prefix() {
        assert_eq!(
            ApiClient::new("http://localhost:3000/").base_url(),
            "http://localhost:3000/api/v1"
        );
    }

    #[test]
    fn error_mapping_by_status() {
        assert_eq!(
            ApiError::from_response(StatusCode::UNAUTHORIZED, r#"{"error":"expired"}"#),
            ApiError::Unauthorized {
                message: "expired".to_string()
            }
        );
        assert_eq!(
            ApiError::from_response(StatusCode::CONFLICT, r#"{"message":"exists","error":"x"}"#),
            ApiError::Client {
                status: 409,
                message: "exists".to_string()
            }
        );
        assert_eq!(
            ApiError::from_response(StatusCode::BAD_GATEWAY, "<html>"),
            ApiError::Server {
                status: 502,
                message: DEFAULT_ERROR_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn ids_are_encoded_as_single_segments() {
        let client = ApiClient::new("http://localhost:3000");
        let url = client.url(&["bedspaces", "ward 3/bed?7", "availability"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/v1/bedspaces/ward%203%2Fbed%3F7/availability"
        );
    }

    #[test]
    fn base_url_without_path_support_is_rejected() {
        let client = ApiClient::new("mailto:ops@example.org");
        assert!(matches!(
            client.url(&["staff"]),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/bedspaces/b-1"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "b-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).with_token(AuthToken::new("t0k"));
        let body = client.get(&["bedspaces", "b-1"], &[]).await.unwrap();
        assert_eq!(body["_id"], "b-1");
    }

    #[tokio::test]
    async fn empty_body_is_null_and_bad_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/staff/s-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/staff/s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri());
        assert_eq!(client.delete(&["staff", "s-1"]).await.unwrap(), Value::Null);
        assert!(matches!(
            client.get(&["staff", "s-1"], &[]).await,
            Err(ApiError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(format!("http://{addr}"));
        assert!(matches!(
            client.get(&["bedspaces"], &[]).await,
            Err(ApiError::Network(_))
        ));
    }
}
