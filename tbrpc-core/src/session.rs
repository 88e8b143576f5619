//! Operator and device sessions
//!
//! Two credential scopes live side by side:
//! - [`Session`]: the user-level JWT pair used for every REST call
//! - [`DeviceSession`]: the selected device and its access token
//!
//! The JWT and refresh token are only changed together, through
//! [`Session::apply_login`], [`Session::apply_refresh`] and
//! [`Session::clear_tokens`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{LoginTokens, TokenPair};
use crate::client::base_url;
use crate::favorites::Favorites;
use crate::store::{ConfigStore, StoreError};

const SESSION_KEY: &str = "session";
const DEVICE_SESSION_KEY: &str = "device_session";
const FAVORITES_KEY: &str = "favorites";

/// Logged-in operator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub server_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default = "default_true")]
    pub remember_me: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Session {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            token: None,
            refresh_token: None,
            user_id: None,
            remember_me: true,
        }
    }
}

impl Session {
    pub fn new(server_url: &str, username: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            username: username.to_string(),
            ..Default::default()
        }
    }

    /// Session that already holds a token pair
    pub fn with_tokens(server_url: &str, username: &str, token: &str, refresh_token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            ..Self::new(server_url, username)
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn apply_login(&mut self, tokens: LoginTokens) {
        self.token = Some(tokens.token);
        self.refresh_token = Some(tokens.refresh_token);
        self.user_id = tokens.user_id;
    }

    /// Install a refreshed pair. A pair without a new refresh token keeps
    /// the previous one.
    pub fn apply_refresh(&mut self, tokens: TokenPair) {
        self.token = Some(tokens.token);
        if let Some(refresh_token) = tokens.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if tokens.user_id.is_some() {
            self.user_id = tokens.user_id;
        }
    }

    /// Same server and user, ignoring trailing slashes on the URL
    pub fn is_account(&self, server_url: &str, username: &str) -> bool {
        base_url(&self.server_url) == base_url(server_url) && self.username == username
    }

    pub fn clear_tokens(&mut self) {
        self.token = None;
        self.refresh_token = None;
        self.user_id = None;
    }

    /// Drop a half-present token pair left by an older or hand-edited state
    /// file
    fn normalized(mut self) -> Self {
        if self.token.is_none() || self.refresh_token.is_none() {
            self.token = None;
            self.refresh_token = None;
        }
        self
    }

    /// `user @ host` label for status lines
    pub fn display_label(&self) -> String {
        let host = reqwest::Url::parse(&self.server_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_else(|| self.server_url.clone());
        format!("{} @ {}", self.username, host)
    }
}

/// Device picked from the directory, with its device-scoped token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub url: String,
    pub access_token: String,
    pub device_name: String,
    pub device_id: String,
}

/// Receives the session every time its tokens change
pub trait SessionSink {
    fn save_session(&mut self, session: &Session) -> Result<(), StoreError>;
}

/// Typed view over a [`ConfigStore`] for everything the client persists
#[derive(Debug)]
pub struct SessionStore<S> {
    store: S,
}

impl<S: ConfigStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn load_session(&self) -> Session {
        self.store
            .get(SESSION_KEY, Session::default())
            .normalized()
    }

    pub fn clear_session(&mut self) -> Result<(), StoreError> {
        self.store.delete(SESSION_KEY)
    }

    pub fn load_device_session(&self) -> Option<DeviceSession> {
        self.store.get(DEVICE_SESSION_KEY, None)
    }

    pub fn save_device_session(&mut self, device: &DeviceSession) -> Result<(), StoreError> {
        self.store.set(DEVICE_SESSION_KEY, device)
    }

    pub fn clear_device_session(&mut self) -> Result<(), StoreError> {
        self.store.delete(DEVICE_SESSION_KEY)
    }

    pub fn load_favorites(&self) -> Favorites {
        let ids: Vec<String> = self.store.get(FAVORITES_KEY, Vec::new());
        Favorites::from_ids(ids)
    }

    pub fn save_favorites(&mut self, favorites: &Favorites) -> Result<(), StoreError> {
        self.store.set(FAVORITES_KEY, &favorites.ids())
    }
}

impl<S: ConfigStore> SessionSink for SessionStore<S> {
    fn save_session(&mut self, session: &Session) -> Result<(), StoreError> {
        self.store.set(SESSION_KEY, session)
    }
}

/// Persist a session change, logging instead of failing the caller
pub(crate) fn persist<P: SessionSink + ?Sized>(sink: &mut P, session: &Session) {
    if let Err(e) = sink.save_session(session) {
        warn!("Failed to persist session for {}: {}", session.username, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn login_tokens() -> LoginTokens {
        LoginTokens {
            token: "jwt-1".into(),
            refresh_token: "refresh-1".into(),
            user_id: Some("user-1".into()),
        }
    }

    #[test]
    fn test_tokens_set_and_cleared_together() {
        let mut session = Session::new("https://tb.example.com", "ops");
        assert!(!session.is_logged_in());

        session.apply_login(login_tokens());
        assert_eq!(session.token(), Some("jwt-1"));
        assert_eq!(session.refresh_token(), Some("refresh-1"));

        session.clear_tokens();
        assert!(session.token().is_none());
        assert!(session.refresh_token().is_none());
        assert_eq!(session.username, "ops");
    }

    #[test]
    fn test_is_account_ignores_trailing_slash() {
        let session = Session::new("https://tb.example.com", "ops");
        assert!(session.is_account("https://tb.example.com/", "ops"));
        assert!(session.is_account(" https://tb.example.com ", "ops"));
        assert!(!session.is_account("https://tb.example.com/", "admin"));
        assert!(!session.is_account("https://other.example.com", "ops"));
    }

    #[test]
    fn test_refresh_without_new_refresh_token_keeps_old() {
        let mut session = Session::with_tokens("https://tb.example.com", "ops", "a", "r");
        session.apply_refresh(TokenPair {
            token: "b".into(),
            refresh_token: None,
            user_id: None,
        });
        assert_eq!(session.token(), Some("b"));
        assert_eq!(session.refresh_token(), Some("r"));
    }

    #[test]
    fn test_session_round_trip_through_store() {
        let mut store = SessionStore::new(MemoryStore::new());
        let mut session = Session::new("https://tb.example.com", "ops");
        session.apply_login(login_tokens());
        session.remember_me = false;

        store.save_session(&session).unwrap();
        assert_eq!(store.load_session(), session);

        store.clear_session().unwrap();
        assert_eq!(store.load_session(), Session::default());
    }

    #[test]
    fn test_half_token_pair_is_dropped_on_load() {
        let mut inner = MemoryStore::new();
        let mut table = toml::Table::new();
        table.insert("serverUrl".into(), "https://tb.example.com".into());
        table.insert("username".into(), "ops".into());
        table.insert("token".into(), "orphan".into());
        inner
            .set_value(SESSION_KEY, toml::Value::Table(table))
            .unwrap();

        let session = SessionStore::new(inner).load_session();
        assert!(!session.is_logged_in());
        assert_eq!(session.username, "ops");
        assert!(session.remember_me);
    }

    #[test]
    fn test_device_session_persistence() {
        let mut store = SessionStore::new(MemoryStore::new());
        assert!(store.load_device_session().is_none());

        let device = DeviceSession {
            url: "https://tb.example.com".into(),
            access_token: "A1_TEST_TOKEN".into(),
            device_name: "Thermostat".into(),
            device_id: "784f394c-42b6-435a-983c-b7beff2784f9".into(),
        };
        store.save_device_session(&device).unwrap();
        assert_eq!(store.load_device_session(), Some(device));

        store.clear_device_session().unwrap();
        assert!(store.load_device_session().is_none());
    }

    #[test]
    fn test_display_label() {
        let session = Session::new("https://tb.example.com:8080", "ops");
        assert_eq!(session.display_label(), "ops @ tb.example.com");
    }
}
