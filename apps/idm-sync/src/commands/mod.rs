//! CLI command implementations

pub mod report;
pub mod run;

use idm_sync_core::ApplicationConnector;
use idm_sync_keycloak::KeycloakDirectory;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::registry;

async fn connectors(config: &AppConfig) -> AppResult<Vec<Box<dyn ApplicationConnector>>> {
    Ok(registry::build_connectors(&config.applications, config.sync.decode_policy()).await?)
}

async fn connector(config: &AppConfig, id: &str) -> AppResult<Box<dyn ApplicationConnector>> {
    let app = config
        .application(id)
        .ok_or_else(|| AppError::UnknownApplication(id.to_string()))?;
    Ok(app.connector(config.sync.decode_policy()).await?)
}

fn directory(config: &AppConfig) -> AppResult<KeycloakDirectory> {
    Ok(KeycloakDirectory::new(&config.directory)?)
}
