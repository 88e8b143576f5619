//! Two-way RPC invoker
//!
//! Calls are authenticated as the logged-in operator (user JWT), not with
//! the device access token, even though they target a single device. Every
//! invoke produces exactly one history record.

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::AuthClient;
use crate::client::{ApiClient, HttpError, base_url};
use crate::history::{LogSink, RecordType, RpcLogRecord};
use crate::retry::{RetryError, execute_with_refresh};
use crate::session::{DeviceSession, Session, SessionSink};

/// Connection probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Input rejected before any request is sent
#[derive(Debug, Error)]
pub enum RpcInputError {
    #[error("Method name is required")]
    MissingMethod,

    #[error("Params are not valid JSON: {0}")]
    InvalidParams(serde_json::Error),
}

/// A validated RPC call
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
    pub timeout: Duration,
}

impl RpcRequest {
    /// Validate user input. Empty params mean `{}`; a missing, non-numeric
    /// or zero timeout falls back to the default.
    pub fn parse(
        method: &str,
        params_text: &str,
        timeout_text: Option<&str>,
    ) -> Result<Self, RpcInputError> {
        let method = method.trim();
        if method.is_empty() {
            return Err(RpcInputError::MissingMethod);
        }

        let params_text = params_text.trim();
        let params = if params_text.is_empty() {
            json!({})
        } else {
            serde_json::from_str(params_text).map_err(RpcInputError::InvalidParams)?
        };

        let timeout_ms = timeout_text
            .and_then(|t| t.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(crate::DEFAULT_RPC_TIMEOUT_MS);

        Ok(Self {
            method: method.to_string(),
            params,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    /// Response received with a non-2xx status
    ServerRejected,
    /// No response within the timeout, or the connection failed
    NoResponse,
    /// Failed before sending, e.g. malformed URL
    RequestSetupError,
    /// No user token to authenticate with
    NotLoggedIn,
}

/// Result of one invoke
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcOutcome {
    Success {
        data: Value,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        /// The user token was renewed on the way
        refreshed: bool,
    },
    Error {
        kind: RpcErrorKind,
        detail: Value,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        /// The call got a 401 and the session could not be renewed
        #[serde(rename = "sessionExpired", skip_serializing_if = "std::ops::Not::not")]
        session_expired: bool,
    },
}

impl RpcOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RpcOutcome::Success { .. })
    }

    /// The stored tokens are dead and the operator has to log in again
    pub fn session_expired(&self) -> bool {
        matches!(
            self,
            RpcOutcome::Error {
                session_expired: true,
                ..
            }
        )
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RpcOutcome::Success { duration_ms, .. } | RpcOutcome::Error { duration_ms, .. } => {
                *duration_ms
            }
        }
    }

    fn to_record(&self, request: &RpcRequest) -> RpcLogRecord {
        let (record_type, data, error, token_refreshed) = match self {
            RpcOutcome::Success { data, refreshed, .. } => {
                (RecordType::Response, Some(data.clone()), None, *refreshed)
            }
            RpcOutcome::Error {
                kind,
                detail,
                session_expired,
                ..
            } => {
                let mut error = json!({ "kind": kind, "detail": detail });
                if *session_expired {
                    error["sessionExpired"] = json!(true);
                }
                (RecordType::Error, None, Some(error), false)
            }
        };

        RpcLogRecord {
            timestamp: Utc::now(),
            record_type,
            method: request.method.clone(),
            params: request.params.clone(),
            duration_ms: self.duration_ms(),
            data,
            error,
            token_refreshed,
        }
    }
}

/// Sort a failed call into the error taxonomy shown to the operator
fn classify(err: &HttpError) -> (RpcErrorKind, Value) {
    match err {
        HttpError::Status { status, body, .. } => {
            let status_text = StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("");
            (
                RpcErrorKind::ServerRejected,
                json!({ "status": status, "statusText": status_text, "data": body }),
            )
        }
        HttpError::InvalidResponse(msg) => (
            RpcErrorKind::ServerRejected,
            json!({ "error": "invalid response", "message": msg }),
        ),
        HttpError::NoResponse(msg) => (
            RpcErrorKind::NoResponse,
            json!({ "error": "no response received", "message": msg }),
        ),
        HttpError::Setup(msg) => (
            RpcErrorKind::RequestSetupError,
            json!({ "error": "request setup failed", "message": msg }),
        ),
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Server URL or device id is not configured")]
    NotConfigured,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Connection failed: {0}")]
    Http(#[from] HttpError),
}

#[derive(Debug, Clone)]
pub struct RpcInvoker {
    api: ApiClient,
    auth: AuthClient,
}

impl RpcInvoker {
    pub fn new(api: ApiClient, auth: AuthClient) -> Self {
        Self { api, auth }
    }

    /// Send one two-way RPC call to the device and log its outcome.
    ///
    /// A 401 triggers a single refresh and a single retry; the new tokens are
    /// persisted through `sink` before the retry is sent.
    pub async fn invoke<P, L>(
        &self,
        session: &mut Session,
        sink: &mut P,
        log: &mut L,
        device: &DeviceSession,
        request: &RpcRequest,
    ) -> RpcOutcome
    where
        P: SessionSink + ?Sized,
        L: LogSink + ?Sized,
    {
        let started = Instant::now();
        let url = format!(
            "{}/api/plugins/rpc/twoway/{}",
            base_url(&device.url),
            device.device_id
        );
        let body = json!({ "method": request.method, "params": request.params });

        let result = execute_with_refresh(&self.auth, session, sink, async |token: &str| {
            let req = self
                .api
                .request(Method::POST, &url, Some(token))
                .timeout(request.timeout)
                .json(&body);
            self.api.send_value(req).await
        })
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(done) => RpcOutcome::Success {
                data: done.value,
                duration_ms,
                refreshed: done.refreshed,
            },
            Err(RetryError::NotLoggedIn) => RpcOutcome::Error {
                kind: RpcErrorKind::NotLoggedIn,
                detail: json!({ "error": "not logged in" }),
                duration_ms,
                session_expired: false,
            },
            Err(RetryError::Request(e)) => {
                let (kind, detail) = classify(&e);
                RpcOutcome::Error {
                    kind,
                    detail,
                    duration_ms,
                    session_expired: false,
                }
            }
            Err(RetryError::RefreshFailed { original, cause }) => {
                warn!("Session could not be renewed: {}", cause);
                let (kind, detail) = classify(&original);
                RpcOutcome::Error {
                    kind,
                    detail,
                    duration_ms,
                    session_expired: true,
                }
            }
        };

        info!(
            "RPC {} -> {} in {}ms",
            request.method,
            if outcome.is_success() { "success" } else { "error" },
            duration_ms
        );

        if let Err(e) = log.append(&outcome.to_record(request)) {
            warn!("Failed to append RPC history: {}", e);
        }

        outcome
    }

    /// Check that the server answers for this device by reading its
    /// attributes with the user token
    pub async fn probe(&self, session: &Session, device: &DeviceSession) -> Result<(), ProbeError> {
        if device.url.trim().is_empty() || device.device_id.trim().is_empty() {
            return Err(ProbeError::NotConfigured);
        }
        let token = session.token().ok_or(ProbeError::NotLoggedIn)?;

        let url = format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/attributes",
            base_url(&device.url),
            device.device_id
        );

        let req = self
            .api
            .request(Method::GET, &url, Some(token))
            .timeout(PROBE_TIMEOUT);
        self.api.send_empty(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryLog;
    use crate::session::SessionStore;
    use crate::store::MemoryStore;

    #[test]
    fn test_parse_defaults() {
        let req = RpcRequest::parse("getState", "", None).unwrap();
        assert_eq!(req.params, json!({}));
        assert_eq!(req.timeout, Duration::from_millis(5000));

        let req = RpcRequest::parse(" setGpio ", r#"{"pin": 7, "value": 1}"#, Some("1500")).unwrap();
        assert_eq!(req.method, "setGpio");
        assert_eq!(req.params["pin"], 7);
        assert_eq!(req.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_bad_timeout_uses_default() {
        for text in ["abc", "0", "-5", ""] {
            let req = RpcRequest::parse("m", "{}", Some(text)).unwrap();
            assert_eq!(req.timeout, Duration::from_millis(5000), "timeout {text:?}");
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            RpcRequest::parse("  ", "{}", None),
            Err(RpcInputError::MissingMethod)
        ));
        assert!(matches!(
            RpcRequest::parse("m", "{pin: 7", None),
            Err(RpcInputError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_classify() {
        let (kind, detail) = classify(&HttpError::Status {
            status: 504,
            message: "Gateway Timeout".into(),
            body: json!({"message": "Device is offline"}),
        });
        assert_eq!(kind, RpcErrorKind::ServerRejected);
        assert_eq!(detail["status"], 504);
        assert_eq!(detail["statusText"], "Gateway Timeout");
        assert_eq!(detail["data"]["message"], "Device is offline");

        let (kind, _) = classify(&HttpError::NoResponse("timed out".into()));
        assert_eq!(kind, RpcErrorKind::NoResponse);

        let (kind, _) = classify(&HttpError::Setup("relative URL".into()));
        assert_eq!(kind, RpcErrorKind::RequestSetupError);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let ok = serde_json::to_value(RpcOutcome::Success {
            data: json!(21.5),
            duration_ms: 40,
            refreshed: true,
        })
        .unwrap();
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["durationMs"], 40);
        assert_eq!(ok["refreshed"], true);

        let err = serde_json::to_value(RpcOutcome::Error {
            kind: RpcErrorKind::NoResponse,
            detail: json!({}),
            duration_ms: 5000,
            session_expired: false,
        })
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["kind"], "no_response");
        assert!(err.get("sessionExpired").is_none());

        let expired = serde_json::to_value(RpcOutcome::Error {
            kind: RpcErrorKind::ServerRejected,
            detail: json!({"status": 401}),
            duration_ms: 12,
            session_expired: true,
        })
        .unwrap();
        assert_eq!(expired["kind"], "server_rejected");
        assert_eq!(expired["sessionExpired"], true);
    }

    #[tokio::test]
    async fn test_invoke_without_login_logs_one_error() {
        let api = ApiClient::new(Duration::from_secs(1));
        let invoker = RpcInvoker::new(api.clone(), AuthClient::new(api));
        let mut session = Session::new("http://127.0.0.1:9", "ops");
        let mut store = SessionStore::new(MemoryStore::new());
        let mut log = MemoryLog::default();
        let device = DeviceSession {
            url: "http://127.0.0.1:9".into(),
            access_token: "A1".into(),
            device_name: "Gate".into(),
            device_id: "d-1".into(),
        };
        let request = RpcRequest::parse("open", "{}", None).unwrap();

        let outcome = invoker
            .invoke(&mut session, &mut store, &mut log, &device, &request)
            .await;

        assert!(matches!(
            outcome,
            RpcOutcome::Error {
                kind: RpcErrorKind::NotLoggedIn,
                ..
            }
        ));
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.records[0].record_type, RecordType::Error);
        assert_eq!(log.records[0].method, "open");
    }

    #[tokio::test]
    async fn test_probe_requires_configuration() {
        let api = ApiClient::new(Duration::from_secs(1));
        let invoker = RpcInvoker::new(api.clone(), AuthClient::new(api));
        let session = Session::with_tokens("http://127.0.0.1:9", "ops", "t", "r");
        let device = DeviceSession {
            url: String::new(),
            access_token: String::new(),
            device_name: String::new(),
            device_id: String::new(),
        };

        let err = invoker.probe(&session, &device).await.unwrap_err();
        assert!(matches!(err, ProbeError::NotConfigured));
    }
}
