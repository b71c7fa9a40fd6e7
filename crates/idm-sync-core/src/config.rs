//! Configuration blocks shared by every REST client.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;

use crate::error::{SyncError, SyncResult};

/// HTTP proxy for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Connection settings of one downstream or directory API.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_retry_wait_seconds")]
    pub retry_wait_seconds: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

fn default_per_page() -> u32 {
    100
}

fn default_retry_wait_seconds() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            per_page: default_per_page(),
            retry_wait_seconds: default_retry_wait_seconds(),
            timeout_secs: default_timeout_secs(),
            proxy: None,
        }
    }

    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    #[must_use]
    pub fn with_retry_wait_seconds(mut self, secs: u64) -> Self {
        self.retry_wait_seconds = secs;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Use `global` unless this client names its own proxy.
    pub fn inherit_proxy(&mut self, global: Option<&ProxyConfig>) {
        if self.proxy.is_none() {
            self.proxy = global.cloned();
        }
    }

    /// Reject settings that cannot work. `max_per_page` is the page size
    /// cap of the remote API: a larger `per_page` makes the first page look
    /// short and ends offset paging after one request.
    pub fn validate(&self, owner: &str, max_per_page: Option<u32>) -> SyncResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(SyncError::Config(format!("{owner}: server_url is required")));
        }
        url::Url::parse(&self.server_url)
            .map_err(|e| SyncError::Config(format!("{owner}: invalid server_url: {e}")))?;
        if self.per_page == 0 {
            return Err(SyncError::Config(format!("{owner}: per_page must be positive")));
        }
        if let Some(max) = max_per_page.filter(|max| self.per_page > *max) {
            return Err(SyncError::Config(format!(
                "{owner}: per_page {} exceeds the server maximum of {max}",
                self.per_page
            )));
        }
        if let Some(proxy) = &self.proxy {
            if proxy.host.trim().is_empty() {
                return Err(SyncError::Config(format!("{owner}: proxy host is empty")));
            }
        }
        Ok(())
    }
}

/// SSO provider downstream accounts are linked to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SsoProvider {
    /// Provider name as known to the application (`ldapmain`, `gitlab`).
    pub name: String,
    /// Directory attribute holding the user's id at the provider.
    pub uid_attribute: String,
}

/// Parse a comma-separated username list, trimming entries and dropping
/// empty ones.
#[must_use]
pub fn parse_excluded_users(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deserialize a plain string into a [`SecretString`].
pub fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
