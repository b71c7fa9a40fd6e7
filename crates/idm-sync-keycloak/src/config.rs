//! Keycloak connection settings.

use idm_sync_core::{deserialize_secret, ClientConfig, SyncError, SyncResult};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Settings of the Keycloak service account used to read the realm.
#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
    #[serde(flatten)]
    pub client: ClientConfig,
    pub realm: String,
    pub client_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub client_secret: SecretString,
}

impl KeycloakConfig {
    pub fn new(
        server_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: ClientConfig::new(server_url),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        self.client.validate("directory", None)?;
        if self.realm.trim().is_empty() {
            return Err(SyncError::Config("directory: realm is required".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(SyncError::Config("directory: client_id is required".into()));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(SyncError::Config("directory: client_secret is required".into()));
        }
        Ok(())
    }
}
