//! YAML configuration with environment overrides.

use anyhow::Context;
use idm_sync_core::{DecodePolicy, ProxyConfig, SyncError, SyncResult};
use idm_sync_keycloak::KeycloakConfig;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

use crate::registry::{self, ApplicationConfig};

pub const CONFIG_PATH_ENV: &str = "IDM_SYNC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/idm-sync.yaml";

/// Matches every application in `enabled_apps`.
pub const ALL_APPS: &str = "*";

/// Complete binary configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    /// Proxy for every client that does not name its own.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    pub directory: KeycloakConfig,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Seconds between the starts of two passes.
    #[serde(default = "default_rate_secs")]
    pub rate_secs: u64,
    /// Domain for users without an email address.
    #[serde(default)]
    pub email_domain: Option<String>,
    #[serde(default = "default_enabled_apps")]
    pub enabled_apps: Vec<String>,
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
    /// Fail an application's pass on groups that match the pattern but
    /// lack a required capture.
    #[serde(default)]
    pub strict_group_decode: bool,
    #[serde(default)]
    pub remove_required_actions: bool,
    #[serde(default = "default_csv_separator")]
    pub csv_separator: char,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            rate_secs: default_rate_secs(),
            email_domain: None,
            enabled_apps: default_enabled_apps(),
            audit_capacity: default_audit_capacity(),
            strict_group_decode: false,
            remove_required_actions: false,
            csv_separator: default_csv_separator(),
        }
    }
}

fn default_rate_secs() -> u64 {
    3600
}

fn default_enabled_apps() -> Vec<String> {
    vec![ALL_APPS.to_string()]
}

fn default_audit_capacity() -> usize {
    1000
}

fn default_csv_separator() -> char {
    ','
}

impl SyncSettings {
    #[must_use]
    pub fn is_enabled(&self, application: &str) -> bool {
        self.enabled_apps
            .iter()
            .any(|app| app == ALL_APPS || app == application)
    }

    #[must_use]
    pub fn decode_policy(&self) -> DecodePolicy {
        DecodePolicy::from_strict(self.strict_group_decode)
    }

    /// The separator as a CSV delimiter byte.
    pub fn csv_delimiter(&self) -> SyncResult<u8> {
        u8::try_from(self.csv_separator)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "sync: csv_separator '{}' is not an ASCII character",
                    self.csv_separator
                ))
            })
    }
}

impl AppConfig {
    /// Location of the configuration file.
    #[must_use]
    pub fn config_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Read, override from the environment, resolve proxies and validate.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::from_file(Self::config_path())?;
        config.apply_env_overrides();
        config.inherit_proxy();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(rate) = lookup("IDM_SYNC_RATE_SECS").and_then(|v| v.parse().ok()) {
            self.sync.rate_secs = rate;
        }
        if let Some(domain) = lookup("IDM_SYNC_EMAIL_DOMAIN") {
            self.sync.email_domain = Some(domain).filter(|d| !d.is_empty());
        }
        if let Some(apps) = lookup("IDM_SYNC_ENABLED_APPS") {
            self.sync.enabled_apps = apps
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secret) = lookup("KEYCLOAK_CLIENT_SECRET") {
            self.directory.client_secret = SecretString::from(secret);
        }
        for app in &mut self.applications {
            let key = match app {
                ApplicationConfig::Gitlab(_) => "GITLAB_TOKEN",
                ApplicationConfig::Mattermost(_) => "MATTERMOST_TOKEN",
            };
            if let Some(token) = lookup(key) {
                app.set_token(token);
            }
        }
    }

    /// Hand the global proxy to every client without its own.
    pub fn inherit_proxy(&mut self) {
        let proxy = self.proxy.clone();
        self.directory.client.inherit_proxy(proxy.as_ref());
        for app in &mut self.applications {
            app.client_mut().inherit_proxy(proxy.as_ref());
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.rate_secs == 0 {
            return Err(SyncError::Config("sync: rate_secs must be positive".into()));
        }
        if self.sync.audit_capacity == 0 {
            return Err(SyncError::Config("sync: audit_capacity must be positive".into()));
        }
        self.sync.csv_delimiter()?;
        self.directory.validate()?;
        registry::validate_all(&self.applications)
    }

    #[must_use]
    pub fn application(&self, id: &str) -> Option<&ApplicationConfig> {
        self.applications.iter().find(|app| app.id() == id)
    }
}
