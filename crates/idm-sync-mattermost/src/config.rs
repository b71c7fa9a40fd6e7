//! Mattermost connector settings.

use idm_sync_core::{
    deserialize_secret, parse_excluded_users, ClientConfig, DecodePolicy, GroupNameDecoder,
    SsoProvider, SyncError, SyncResult,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const TEAM_NAME_CAPTURE: &str = "teamName";
pub const TEAM_ADMIN_CAPTURE: &str = "teamAdmin";

/// Largest `per_page` the REST v4 API honours.
pub const MAX_PER_PAGE: u32 = 200;

fn default_group_pattern() -> String {
    r"^APP_MM_(?<teamName>[a-z0-9-]+)(?<teamAdmin>_ADMIN)?$".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MattermostConfig {
    #[serde(flatten)]
    pub client: ClientConfig,
    /// Personal access token of a system admin.
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    #[serde(default)]
    pub group_search: Option<String>,
    #[serde(default = "default_group_pattern")]
    pub group_pattern: String,
    #[serde(default)]
    pub excluded_users: String,
    /// Authentication service new accounts are bound to (`gitlab`, `ldap`).
    #[serde(default)]
    pub provider: Option<SsoProvider>,
    /// Remove channel members that are not members of the team.
    #[serde(default)]
    pub remove_channel_members: bool,
    /// Team every synced user joins.
    #[serde(default)]
    pub global_team: Option<String>,
}

impl MattermostConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: ClientConfig::new(server_url),
            token: SecretString::from(token.into()),
            group_search: None,
            group_pattern: default_group_pattern(),
            excluded_users: String::new(),
            provider: None,
            remove_channel_members: false,
            global_team: None,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.client.validate("mattermost", Some(MAX_PER_PAGE))?;
        if self.token.expose_secret().trim().is_empty() {
            return Err(SyncError::Config("mattermost: token is required".into()));
        }
        self.decoder(DecodePolicy::default()).map(|_| ())
    }

    pub fn decoder(&self, policy: DecodePolicy) -> SyncResult<GroupNameDecoder> {
        GroupNameDecoder::new(
            &self.group_pattern,
            TEAM_NAME_CAPTURE,
            None,
            Some(TEAM_ADMIN_CAPTURE),
        )
        .map(|d| d.with_policy(policy))
    }

    #[must_use]
    pub fn excluded(&self) -> BTreeSet<String> {
        parse_excluded_users(&self.excluded_users)
    }
}
