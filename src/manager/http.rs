//! HTTP client for the remote configuration manager
//!
//! Endpoints (all `GET`, authenticated with query parameters
//! `ip`, `port`, `user`, `passwd`):
//! - `{address}/api/v1/config/instances_polling` → `data: ["orders", ...]`
//! - `{address}/api/v1/config/instance_polling/{destination}` →
//!   `data: {"content": {...}, "version": "..."}` or `data: null`
//!
//! Every response is wrapped in `{"code": 0, "message": "...", "data": ...}`;
//! a non-zero code is an error.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::client::{RemoteConfigClient, RemoteInstance};
use super::errors::{ManagerError, ManagerResult};

/// Default HTTP request timeout (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Credentials and identity sent with every request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerAuth {
    pub ip: String,
    pub port: u16,
    pub user: Option<String>,
    pub passwd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// HTTP-based implementation of [`RemoteConfigClient`].
///
/// Must be used from blocking contexts only (never inside an async task).
#[derive(Clone)]
pub struct HttpConfigClient {
    address: String,
    auth: ManagerAuth,
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for HttpConfigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfigClient")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpConfigClient {
    /// Create a client with the default timeout.
    pub fn new(address: impl Into<String>, auth: ManagerAuth) -> ManagerResult<Self> {
        Self::with_timeout(address, auth, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom timeout.
    pub fn with_timeout(
        address: impl Into<String>,
        auth: ManagerAuth,
        timeout: Duration,
    ) -> ManagerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cdc-warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ManagerError::ClientBuild(e.to_string()))?;

        Ok(Self {
            address: address.into().trim_end_matches('/').to_string(),
            auth,
            client,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            format!("{}{}", self.address, path)
        } else {
            format!("http://{}{}", self.address, path)
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> ManagerResult<Option<T>> {
        let url = self.url(path);
        let port = self.auth.port.to_string();
        let mut query: Vec<(&str, &str)> = vec![("ip", self.auth.ip.as_str()), ("port", port.as_str())];
        if let Some(user) = &self.auth.user {
            query.push(("user", user.as_str()));
        }
        if let Some(passwd) = &self.auth.passwd {
            query.push(("passwd", passwd.as_str()));
        }

        let response = self.client.get(&url).query(&query).send().map_err(|e| {
            if e.is_timeout() {
                ManagerError::Timeout {
                    url: url.clone(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ManagerError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ManagerError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let envelope: Envelope<T> = response.json().map_err(|e| ManagerError::Parse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if envelope.code != 0 {
            return Err(ManagerError::Remote {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }
}

impl RemoteConfigClient for HttpConfigClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn list_instances(&self) -> ManagerResult<Vec<String>> {
        Ok(self
            .get::<Vec<String>>("/api/v1/config/instances_polling")?
            .unwrap_or_default())
    }

    fn fetch_instance(&self, destination: &str) -> ManagerResult<RemoteInstance> {
        self.get::<RemoteInstance>(&format!(
            "/api/v1/config/instance_polling/{}",
            destination
        ))?
        .ok_or_else(|| ManagerError::NotFound(destination.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpConfigClient::new("manager:8089/", ManagerAuth::default()).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(client.address(), "manager:8089");
        assert_eq!(
            client.url("/api/v1/config/instances_polling"),
            "http://manager:8089/api/v1/config/instances_polling"
        );
    }

    #[test]
    fn test_url_keeps_scheme() {
        let client = HttpConfigClient::with_timeout(
            "https://manager.internal",
            ManagerAuth::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.url("/x"), "https://manager.internal/x");
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: Envelope<RemoteInstance> = serde_json::from_str(
            r#"{"code": 0, "message": "ok", "data": {"content": {"db": "orders"}, "version": "3"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.unwrap().version, "3");

        let envelope: Envelope<Vec<String>> =
            serde_json::from_str(r#"{"code": 401, "message": "denied", "data": null}"#).unwrap();
        assert_eq!(envelope.code, 401);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_unreachable_manager_is_an_error() {
        let client = HttpConfigClient::with_timeout(
            "127.0.0.1:1",
            ManagerAuth::default(),
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(client.list_instances().is_err());
    }
}
