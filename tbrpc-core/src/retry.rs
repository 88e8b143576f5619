//! Run once, refresh once, retry once
//!
//! Shared by the device directory and the RPC invoker so neither carries
//! its own copy of the 401 handling.

use tracing::{debug, warn};

use crate::auth::{AuthClient, AuthError};
use crate::client::HttpError;
use crate::session::{Session, SessionSink, persist};

/// Successful result of a refresh-wrapped call
#[derive(Debug, Clone, PartialEq)]
pub struct Refreshed<T> {
    pub value: T,
    /// The token was renewed before the call succeeded
    pub refreshed: bool,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// The session holds no bearer token
    NotLoggedIn,

    /// The call failed with something other than a recoverable 401, or the
    /// retry after a refresh failed too
    Request(E),

    /// The call got a 401 and the refresh that followed failed
    RefreshFailed { original: E, cause: AuthError },
}

/// Errors that can say whether the server rejected the bearer token
pub trait Unauthorized {
    fn is_unauthorized(&self) -> bool;
}

impl Unauthorized for HttpError {
    fn is_unauthorized(&self) -> bool {
        HttpError::is_unauthorized(self)
    }
}

/// Run `request` with the session's token; on a 401 refresh the session
/// once, persist it, and run `request` exactly once more with the new token.
pub async fn execute_with_refresh<T, E, P, F>(
    auth: &AuthClient,
    session: &mut Session,
    sink: &mut P,
    mut request: F,
) -> Result<Refreshed<T>, RetryError<E>>
where
    E: Unauthorized,
    P: SessionSink + ?Sized,
    F: AsyncFnMut(&str) -> Result<T, E>,
{
    let Some(token) = session.token().map(String::from) else {
        return Err(RetryError::NotLoggedIn);
    };

    let original = match request(&token).await {
        Ok(value) => {
            return Ok(Refreshed {
                value,
                refreshed: false,
            });
        }
        Err(e) if e.is_unauthorized() => e,
        Err(e) => return Err(RetryError::Request(e)),
    };

    debug!("Token rejected for {}, refreshing", session.username);

    let Some(refresh_token) = session.refresh_token().map(String::from) else {
        return Err(RetryError::RefreshFailed {
            original,
            cause: AuthError::RefreshRejected { status: 0 },
        });
    };

    let tokens = match auth.refresh(&session.server_url, &refresh_token).await {
        Ok(tokens) => tokens,
        Err(cause) => {
            warn!("Token refresh failed: {}", cause);
            return Err(RetryError::RefreshFailed { original, cause });
        }
    };

    session.apply_refresh(tokens);
    persist(sink, session);

    let Some(token) = session.token().map(String::from) else {
        return Err(RetryError::NotLoggedIn);
    };

    request(&token)
        .await
        .map(|value| Refreshed {
            value,
            refreshed: true,
        })
        .map_err(RetryError::Request)
}
