//! ThingsBoard REST plumbing
//!
//! Every ThingsBoard call goes through [`ApiClient`]: it attaches the
//! `X-Authorization: Bearer` header, applies the default request timeout and
//! folds transport and status failures into a single [`HttpError`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Header carrying the user-level JWT
pub const AUTH_HEADER: &str = "X-Authorization";

#[derive(Debug, Error)]
pub enum HttpError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: Value,
    },

    /// Request was sent but no response arrived (timeout, refused, reset)
    #[error("No response from server: {0}")]
    NoResponse(String),

    /// Request could not be built, e.g. malformed URL
    #[error("Request setup failed: {0}")]
    Setup(String),

    /// 2xx response whose body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl HttpError {
    /// Build a status error from a raw response body.
    ///
    /// ThingsBoard error bodies look like `{"status":401,"message":"..."}`;
    /// the `message` field is used when present.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body: Value = serde_json::from_str(body).unwrap_or_else(|_| {
            if body.is_empty() {
                Value::Null
            } else {
                Value::String(body.to_string())
            }
        });

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| status.canonical_reason().map(String::from))
            .unwrap_or_else(|| "unknown error".to_string());

        HttpError::Status {
            status: status.as_u16(),
            message,
            body,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HttpError::Status { status: 401, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            HttpError::Setup(err.to_string())
        } else if err.is_decode() {
            HttpError::InvalidResponse(err.to_string())
        } else {
            HttpError::NoResponse(err.to_string())
        }
    }
}

/// Thin wrapper around a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client whose requests time out after `timeout` unless
    /// overridden per request
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Start a request, attaching the bearer header when a token is given
    pub fn request(&self, method: Method, url: &str, token: Option<&str>) -> RequestBuilder {
        let mut req = self.client.request(method, url).timeout(self.timeout);

        if let Some(token) = token {
            req = req.header(AUTH_HEADER, format!("Bearer {}", token));
        }

        req
    }

    /// Send and decode a typed JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, HttpError> {
        let resp = check_status(req.send().await?).await?;
        resp.json::<T>()
            .await
            .map_err(|e| HttpError::InvalidResponse(e.to_string()))
    }

    /// Send and return whatever the server answered as JSON.
    ///
    /// Non-JSON text comes back as a JSON string, an empty body as `null`.
    pub async fn send_value(&self, req: RequestBuilder) -> Result<Value, HttpError> {
        let resp = check_status(req.send().await?).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Send and discard the body
    pub async fn send_empty(&self, req: RequestBuilder) -> Result<(), HttpError> {
        check_status(req.send().await?).await?;
        Ok(())
    }
}

async fn check_status(resp: Response) -> Result<Response, HttpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(HttpError::from_status(status, &body))
}

/// Strip trailing slashes so endpoint paths can be appended directly
pub fn base_url(server_url: &str) -> String {
    server_url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(base_url("https://tb.example.com/"), "https://tb.example.com");
        assert_eq!(base_url(" https://tb.example.com// "), "https://tb.example.com");
        assert_eq!(base_url("http://localhost:8080"), "http://localhost:8080");
    }

    #[test]
    fn test_status_error_uses_server_message() {
        let err = HttpError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"status":401,"message":"Authentication failed","errorCode":10}"#,
        );
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));
        match err {
            HttpError::Status { message, body, .. } => {
                assert_eq!(message, "Authentication failed");
                assert_eq!(body["errorCode"], 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_error_falls_back_to_reason() {
        let err = HttpError::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        match err {
            HttpError::Status { message, body, status } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
                assert_eq!(body, Value::String("upstream down".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!HttpError::NoResponse("timeout".into()).is_unauthorized());
    }

    #[tokio::test]
    async fn test_malformed_url_is_setup_error() {
        let api = ApiClient::new(Duration::from_secs(1));
        let req = api.request(Method::GET, "not a url/api/auth/login", None);
        let err = api.send_empty(req).await.unwrap_err();
        assert!(matches!(err, HttpError::Setup(_)), "got {err:?}");
    }
}
