//! Keycloak admin REST API access.

use async_trait::async_trait;
use idm_sync_core::{
    AttributeUpdate, AuthScheme, DirectoryGroup, DirectoryUser, IdentityDirectory, OffsetStyle,
    RestClient, SyncError, SyncResult,
};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::config::KeycloakConfig;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Reads groups and users of one realm through a confidential client with a
/// service account.
#[derive(Debug)]
pub struct KeycloakDirectory {
    token_url: String,
    realm: String,
    client_id: String,
    client_secret: SecretString,
    rest: RestClient,
}

impl KeycloakDirectory {
    pub fn new(config: &KeycloakConfig) -> SyncResult<Self> {
        config.validate()?;
        let server_url = config.client.server_url.trim_end_matches('/');
        Ok(Self {
            token_url: format!("{server_url}/realms/{}/protocol/openid-connect/token", config.realm),
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            rest: RestClient::new(
                "keycloak",
                &config.client,
                &format!("/admin/realms/{}", config.realm),
            )?,
        })
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    async fn ensure_authenticated(&self) -> SyncResult<()> {
        if self.rest.is_authorized().await {
            Ok(())
        } else {
            Err(SyncError::NotAuthenticated)
        }
    }

    async fn login(&self) -> SyncResult<SecretString> {
        let response = self
            .rest
            .http()
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("Token request failed with status {status}: {body}")));
        }

        let token: TokenResponse = response.json().await?;
        token
            .access_token
            .map(SecretString::from)
            .ok_or_else(|| SyncError::Auth("No 'access_token' property in JSON response".into()))
    }

    fn search_query(search: Option<&str>) -> Vec<(&'static str, String)> {
        search
            .filter(|s| !s.trim().is_empty())
            .map(|s| vec![("search", s.to_string())])
            .unwrap_or_default()
    }
}

#[async_trait]
impl IdentityDirectory for KeycloakDirectory {
    #[instrument(skip(self), fields(realm = %self.realm))]
    async fn authenticate(&self) -> bool {
        info!("Authenticating");
        match self.login().await {
            Ok(token) => {
                self.rest.authorize(AuthScheme::Bearer(token)).await;
                true
            }
            Err(e) => {
                error!(error = %e, "Authentication failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(realm = %self.realm))]
    async fn get_groups(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryGroup>> {
        self.ensure_authenticated().await?;
        debug!("Retrieving groups");
        self.rest
            .get_list_offset("/groups", &Self::search_query(search), OffsetStyle::FIRST_MAX)
            .await
            .ok_or_else(|| SyncError::Unavailable("retrieving groups failed".into()))
    }

    #[instrument(skip(self), fields(realm = %self.realm))]
    async fn get_users(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryUser>> {
        self.ensure_authenticated().await?;
        debug!("Retrieving users");
        self.rest
            .get_list_offset("/users", &Self::search_query(search), OffsetStyle::FIRST_MAX)
            .await
            .ok_or_else(|| SyncError::Unavailable("retrieving users failed".into()))
    }

    #[instrument(skip(self, group), fields(realm = %self.realm, group = %group.path))]
    async fn get_group_members(&self, group: &DirectoryGroup) -> SyncResult<Vec<DirectoryUser>> {
        self.ensure_authenticated().await?;
        debug!("Retrieving group members");
        self.rest
            .get_list_offset(&format!("/groups/{}/members", group.id), &[], OffsetStyle::FIRST_MAX)
            .await
            .ok_or_else(|| SyncError::Unavailable(format!("retrieving members of '{}' failed", group.path)))
    }

    #[instrument(skip(self, user, update), fields(realm = %self.realm, username = %user.username))]
    async fn update_user_attributes(&self, user: &mut DirectoryUser, update: &AttributeUpdate) -> bool {
        if self.ensure_authenticated().await.is_err() {
            error!("Authentication required");
            return false;
        }
        debug!(attributes = ?update, "Updating user attributes");
        let mut merged = user.clone();
        merged.apply_attribute_update(update);
        let updated = self
            .rest
            .send(
                Method::PUT,
                &format!("/users/{}", user.id),
                &[],
                Some(&json!({ "attributes": merged.attributes })),
            )
            .await;
        if updated {
            user.apply_attribute_update(update);
        }
        updated
    }

    #[instrument(skip(self, user), fields(realm = %self.realm, username = %user.username))]
    async fn remove_required_actions(&self, user: &DirectoryUser) -> bool {
        if self.ensure_authenticated().await.is_err() {
            error!("Authentication required");
            return false;
        }
        debug!("Removing required actions");
        self.rest
            .send(
                Method::PUT,
                &format!("/users/{}", user.id),
                &[],
                Some(&json!({ "requiredActions": [] })),
            )
            .await
    }
}
