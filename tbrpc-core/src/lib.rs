//! tbrpc-core: Shared library for the ThingsBoard two-way RPC debugger
//!
//! This crate provides:
//! - Authenticated REST client (login, token refresh)
//! - Paginated device directory and device credential lookup
//! - Two-way RPC invoker with one-shot refresh-and-retry
//! - Session, favorites and config persistence
//! - Append-only RPC history log

pub mod auth;
pub mod client;
pub mod config;
pub mod directory;
pub mod favorites;
pub mod history;
pub mod nav;
pub mod retry;
pub mod rpc;
pub mod session;
pub mod store;
pub mod templates;

pub use auth::{AuthClient, AuthError, LoginTokens, TokenPair};
pub use client::{ApiClient, HttpError};
pub use config::Config;
pub use directory::{Device, DeviceDirectory, DirectoryError};
pub use favorites::Favorites;
pub use history::{JsonlLog, LogSink, RpcLogRecord};
pub use nav::{Navigator, Screen};
pub use retry::{Refreshed, RetryError, execute_with_refresh};
pub use rpc::{RpcErrorKind, RpcInvoker, RpcOutcome, RpcRequest};
pub use session::{DeviceSession, Session, SessionSink, SessionStore};
pub use store::{ConfigStore, FileStore, MemoryStore, StoreError};

/// Devices requested per page from the tenant device listing
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Two-way RPC timeout when the caller gives none
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5000;

/// Pause before sending the operator back to the login screen
pub const SESSION_EXPIRED_REDIRECT_MS: u64 = 2000;
