//! Gateway Authentication
//!
//! The gateway authenticates on the WebSocket handshake. The client sends
//! `Authorization: Bearer <token>`. Without a token, the literal `anonymous`
//! is sent and the gateway decides what an anonymous client may see.
//!
//! Endpoints may be configured with an `http(s)://` scheme and are rewritten
//! to `ws(s)://` here.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::application::ports::TransportError;

/// Token sent when none is configured.
pub const ANONYMOUS_TOKEN: &str = "anonymous";

/// Bearer token for the gateway handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Create a token. Blank input yields the anonymous token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.trim().is_empty() {
            Self::anonymous()
        } else {
            Self(token.trim().to_string())
        }
    }

    /// The anonymous token.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_TOKEN.to_string())
    }

    /// Whether this is the anonymous token.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_TOKEN
    }

    /// Raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_anonymous() {
            f.write_str("AuthToken(anonymous)")
        } else {
            f.write_str("AuthToken([REDACTED])")
        }
    }
}

/// Rewrite an endpoint to a WebSocket URL.
///
/// # Errors
///
/// Returns [`TransportError::InvalidEndpoint`] for an empty endpoint or an
/// unsupported scheme.
pub fn websocket_url(endpoint: &str) -> Result<String, TransportError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(TransportError::InvalidEndpoint("empty endpoint".to_string()));
    }

    if let Some(rest) = endpoint.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(endpoint.to_string())
    } else {
        Err(TransportError::InvalidEndpoint(format!(
            "unsupported scheme in '{endpoint}'"
        )))
    }
}

/// Build the handshake request carrying the bearer token.
///
/// # Errors
///
/// Returns [`TransportError::InvalidEndpoint`] if the URL or header is invalid.
pub fn handshake_request(endpoint: &str, token: &str) -> Result<Request, TransportError> {
    let url = websocket_url(endpoint)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

    let token = if token.trim().is_empty() {
        ANONYMOUS_TOKEN
    } else {
        token.trim()
    };
    let header = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| TransportError::InvalidEndpoint(format!("invalid token: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, header);
    Ok(request)
}
