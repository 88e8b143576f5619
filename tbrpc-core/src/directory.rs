//! Tenant device directory
//!
//! Devices are fetched page by page with a fixed page size. A page shorter
//! than the page size is the last one; a full page always costs one more
//! request, even if that page comes back empty.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::{AuthClient, AuthError};
use crate::client::{ApiClient, HttpError, base_url};
use crate::retry::{RetryError, execute_with_refresh};
use crate::session::{DeviceSession, Session, SessionSink};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session expired, please log in again ({0})")]
    SessionExpired(AuthError),

    #[error("Failed to fetch devices: {0}")]
    Fetch(HttpError),
}

impl From<RetryError<HttpError>> for DirectoryError {
    fn from(err: RetryError<HttpError>) -> Self {
        match err {
            RetryError::NotLoggedIn => DirectoryError::NotLoggedIn,
            RetryError::Request(e) => DirectoryError::Fetch(e),
            RetryError::RefreshFailed { cause, .. } => DirectoryError::SessionExpired(cause),
        }
    }
}

/// A device as listed by the server; `active` is the status at fetch time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeviceRecord")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntityRef {
    Bare(String),
    Wrapped { id: String },
}

#[derive(Deserialize)]
struct DeviceRecord {
    id: EntityRef,
    name: String,
    #[serde(rename = "type", default)]
    device_type: Option<String>,
    #[serde(default)]
    active: bool,
}

impl From<DeviceRecord> for Device {
    fn from(r: DeviceRecord) -> Self {
        let id = match r.id {
            EntityRef::Bare(id) => id,
            EntityRef::Wrapped { id } => id,
        };
        Self {
            id,
            name: r.name,
            device_type: r.device_type.filter(|t| !t.is_empty()),
            active: r.active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DevicePage {
    data: Vec<Device>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceCredentials {
    credentials_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    api: ApiClient,
    auth: AuthClient,
    page_size: u32,
}

impl DeviceDirectory {
    pub fn new(api: ApiClient, auth: AuthClient) -> Self {
        Self {
            api,
            auth,
            page_size: crate::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch every device of the tenant.
    ///
    /// A 401 on any page refreshes the session once and restarts from page
    /// 0 with the new token. Errors discard the pages already fetched.
    pub async fn list_devices<P: SessionSink + ?Sized>(
        &self,
        session: &mut Session,
        sink: &mut P,
    ) -> Result<Vec<Device>, DirectoryError> {
        let base = base_url(&session.server_url);

        let result = execute_with_refresh(&self.auth, session, sink, async |token: &str| {
            self.fetch_all(&base, token).await
        })
        .await?;

        info!(
            "Fetched {} devices from {}{}",
            result.value.len(),
            base,
            if result.refreshed { " (token refreshed)" } else { "" }
        );
        Ok(result.value)
    }

    async fn fetch_all(&self, base: &str, token: &str) -> Result<Vec<Device>, HttpError> {
        let mut devices = Vec::new();
        let mut page = 0u32;

        loop {
            let batch = self.fetch_page(base, token, page).await?;
            let short = batch.len() < self.page_size as usize;
            devices.extend(batch);

            if short {
                return Ok(devices);
            }
            page += 1;
        }
    }

    async fn fetch_page(&self, base: &str, token: &str, page: u32) -> Result<Vec<Device>, HttpError> {
        let url = format!("{}/api/tenant/devicesNew", base);
        debug!("GET {} page={} pageSize={}", url, page, self.page_size);

        let req = self
            .api
            .request(Method::GET, &url, Some(token))
            .query(&[("pageSize", self.page_size), ("page", page)]);

        let body: DevicePage = self.api.send_json(req).await?;
        Ok(body.data)
    }

    /// Look up the device's access token and build the session used by the
    /// RPC console
    pub async fn select_device<P: SessionSink + ?Sized>(
        &self,
        session: &mut Session,
        sink: &mut P,
        device: &Device,
    ) -> Result<DeviceSession, DirectoryError> {
        let base = base_url(&session.server_url);
        let url = format!("{}/api/device/{}/credentials", base, device.id);

        let result = execute_with_refresh(&self.auth, session, sink, async |token: &str| {
            debug!("GET {}", url);
            let req = self.api.request(Method::GET, &url, Some(token));
            self.api.send_json::<DeviceCredentials>(req).await
        })
        .await?;

        let access_token = result.value.credentials_id.ok_or_else(|| {
            DirectoryError::Fetch(HttpError::InvalidResponse(
                "credentials response has no credentialsId".to_string(),
            ))
        })?;

        Ok(DeviceSession {
            url: base,
            access_token,
            device_name: device.name.clone(),
            device_id: device.id.clone(),
        })
    }
}

/// Case-insensitive match on name or type; an empty query keeps everything
pub fn filter_devices<'a>(devices: &'a [Device], query: &str) -> Vec<&'a Device> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return devices.iter().collect();
    }

    devices
        .iter()
        .filter(|d| {
            d.name.to_lowercase().contains(&query)
                || d
                    .device_type
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&query))
        })
        .collect()
}

/// Find a device by exact id, falling back to exact name
pub fn find_device<'a>(devices: &'a [Device], key: &str) -> Option<&'a Device> {
    devices
        .iter()
        .find(|d| d.id == key)
        .or_else(|| devices.iter().find(|d| d.name == key))
}
