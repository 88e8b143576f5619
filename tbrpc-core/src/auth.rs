//! ThingsBoard JWT authentication
//!
//! ThingsBoard issues a token pair on login:
//! - Access token: short-lived JWT sent as `X-Authorization: Bearer ...`
//! - Refresh token: longer-lived, exchanged at `/api/auth/token`
//!
//! A refresh is always a single call. It never triggers another refresh,
//! even when the server answers 401.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{ApiClient, HttpError, base_url};
use crate::session::{Session, SessionSink, persist};

/// Tokens returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub token: String,
    pub refresh_token: String,
    pub user_id: Option<String>,
}

/// Tokens returned by a successful refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session can no longer be renewed (HTTP {status})")]
    RefreshRejected { status: u16 },

    #[error("Cannot reach server: {0}")]
    Unreachable(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request setup failed: {0}")]
    RequestSetup(String),
}

/// Login/refresh response body. Every field is optional so a missing
/// token is reported as such rather than as a decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<Value>,
}

/// ThingsBoard ids come either bare or as `{"entityType": ..., "id": ...}`
fn entity_id(value: Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Exchange credentials for a token pair
    pub async fn login(
        &self,
        server_url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginTokens, AuthError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,
        }

        if server_url.trim().is_empty() {
            return Err(AuthError::MissingField("server URL"));
        }
        if username.trim().is_empty() {
            return Err(AuthError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let url = format!("{}/api/auth/login", base_url(server_url));
        debug!("POST {}", url);

        let req = self
            .api
            .request(Method::POST, &url, None)
            .json(&LoginRequest { username, password });

        let resp: TokenResponse = self.api.send_json(req).await.map_err(|e| match e {
            HttpError::Status { status: 401, .. } => AuthError::InvalidCredentials,
            HttpError::Status { message, .. } => AuthError::ServerError(message),
            HttpError::NoResponse(msg) => AuthError::Unreachable(msg),
            HttpError::Setup(msg) => AuthError::RequestSetup(msg),
            HttpError::InvalidResponse(msg) => AuthError::ServerError(msg),
        })?;

        let (Some(token), Some(refresh_token)) = (resp.token, resp.refresh_token) else {
            return Err(AuthError::ServerError(
                "login response is missing the token pair".to_string(),
            ));
        };

        info!("Logged in to {} as {}", base_url(server_url), username);

        Ok(LoginTokens {
            token,
            refresh_token,
            user_id: resp.user_id.and_then(entity_id),
        })
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Any answer without a `token` field, whatever its status, means the
    /// session cannot be renewed.
    pub async fn refresh(&self, server_url: &str, refresh_token: &str) -> Result<TokenPair, AuthError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
        }

        let url = format!("{}/api/auth/token", base_url(server_url));
        debug!("POST {}", url);

        let req = self
            .api
            .request(Method::POST, &url, None)
            .json(&RefreshRequest { refresh_token });

        let (status, resp) = match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.json::<TokenResponse>().await.unwrap_or_default();
                (status, body)
            }
            Err(e) => {
                return Err(match HttpError::from(e) {
                    HttpError::Setup(msg) => AuthError::RequestSetup(msg),
                    other => AuthError::Unreachable(other.to_string()),
                });
            }
        };

        match resp.token {
            Some(token) if status.is_success() => {
                info!("Refreshed access token for {}", base_url(server_url));
                Ok(TokenPair {
                    token,
                    refresh_token: resp.refresh_token,
                    user_id: resp.user_id.and_then(entity_id),
                })
            }
            _ => Err(AuthError::RefreshRejected {
                status: status.as_u16(),
            }),
        }
    }

    /// Renew a stored session without asking for the password again.
    ///
    /// On failure the session is left untouched and the caller falls back to
    /// a manual login.
    pub async fn resume<P: SessionSink + ?Sized>(
        &self,
        session: &mut Session,
        sink: &mut P,
    ) -> Result<(), AuthError> {
        let Some(refresh_token) = session.refresh_token().map(String::from) else {
            return Err(AuthError::RefreshRejected { status: 0 });
        };

        let tokens = self.refresh(&session.server_url, &refresh_token).await?;
        session.apply_refresh(tokens);
        persist(sink, session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_entity_id_shapes() {
        assert_eq!(entity_id(Value::String("u-1".into())), Some("u-1".into()));
        assert_eq!(
            entity_id(serde_json::json!({"entityType": "USER", "id": "u-2"})),
            Some("u-2".into())
        );
        assert_eq!(entity_id(Value::Null), None);
    }

    #[test]
    fn test_token_response_allows_missing_fields() {
        let resp: TokenResponse = serde_json::from_str(r#"{"refreshToken":"r"}"#).unwrap();
        assert!(resp.token.is_none());
        assert_eq!(resp.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_login_rejects_empty_fields_before_sending() {
        let auth = AuthClient::new(ApiClient::new(Duration::from_secs(1)));

        let err = auth.login("", "ops", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingField("server URL")));

        let err = auth.login("https://tb.example.com", " ", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingField("username")));

        let err = auth.login("https://tb.example.com", "ops", "").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingField("password")));
    }

    #[tokio::test]
    async fn test_resume_without_refresh_token_is_rejected() {
        use crate::session::SessionStore;
        use crate::store::MemoryStore;

        let auth = AuthClient::new(ApiClient::new(Duration::from_secs(1)));
        let mut session = Session::new("https://tb.example.com", "ops");
        let mut store = SessionStore::new(MemoryStore::new());

        let err = auth.resume(&mut session, &mut store).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshRejected { .. }));
        assert_eq!(store.inner().writes(), 0);
    }
}
