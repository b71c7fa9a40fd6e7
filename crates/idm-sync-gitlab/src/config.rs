//! GitLab connector settings.

use idm_sync_core::{
    deserialize_secret, parse_excluded_users, ClientConfig, DecodePolicy, GroupNameDecoder,
    SsoProvider, SyncError, SyncResult,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const GROUP_PATH_CAPTURE: &str = "groupPath";
pub const PERMISSION_CAPTURE: &str = "permission";

/// Largest `per_page` the REST v4 API honours.
pub const MAX_PER_PAGE: u32 = 100;

fn default_group_pattern() -> String {
    r"^APP_GIT_(?<groupPath>\w*?)_(?<permission>[A-Za-z]*)$".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabConfig {
    #[serde(flatten)]
    pub client: ClientConfig,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    /// Directory search selecting this application's groups.
    #[serde(default)]
    pub group_search: Option<String>,
    #[serde(default = "default_group_pattern")]
    pub group_pattern: String,
    /// Comma-separated usernames never blocked or removed.
    #[serde(default)]
    pub excluded_users: String,
    #[serde(default)]
    pub provider: Option<SsoProvider>,
    /// Remove project members that are not members of the parent group.
    #[serde(default)]
    pub remove_project_members: bool,
}

impl GitLabConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: ClientConfig::new(server_url),
            token: SecretString::from(token.into()),
            group_search: None,
            group_pattern: default_group_pattern(),
            excluded_users: String::new(),
            provider: None,
            remove_project_members: false,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.client.validate("gitlab", Some(MAX_PER_PAGE))?;
        if self.token.expose_secret().trim().is_empty() {
            return Err(SyncError::Config("gitlab: token is required".into()));
        }
        self.decoder(DecodePolicy::default()).map(|_| ())
    }

    pub fn decoder(&self, policy: DecodePolicy) -> SyncResult<GroupNameDecoder> {
        GroupNameDecoder::new(
            &self.group_pattern,
            GROUP_PATH_CAPTURE,
            Some(PERMISSION_CAPTURE),
            None,
        )
        .map(|d| d.with_policy(policy))
    }

    #[must_use]
    pub fn excluded(&self) -> BTreeSet<String> {
        parse_excluded_users(&self.excluded_users)
    }
}
