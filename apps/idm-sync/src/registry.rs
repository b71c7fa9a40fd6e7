//! Configured applications and the connectors built from them.

use idm_sync_core::{ApplicationConnector, ClientConfig, DecodePolicy, SyncError, SyncResult};
use idm_sync_gitlab::{GitLabConfig, GitLabConnector};
use idm_sync_mattermost::{MattermostConfig, MattermostConnector};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::info;

/// One `applications` entry, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ApplicationConfig {
    Gitlab(GitLabConfig),
    Mattermost(MattermostConfig),
}

impl ApplicationConfig {
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            ApplicationConfig::Gitlab(_) => idm_sync_gitlab::APPLICATION_ID,
            ApplicationConfig::Mattermost(_) => idm_sync_mattermost::APPLICATION_ID,
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        match self {
            ApplicationConfig::Gitlab(config) => config.validate(),
            ApplicationConfig::Mattermost(config) => config.validate(),
        }
    }

    pub fn client_mut(&mut self) -> &mut ClientConfig {
        match self {
            ApplicationConfig::Gitlab(config) => &mut config.client,
            ApplicationConfig::Mattermost(config) => &mut config.client,
        }
    }

    pub fn set_token(&mut self, token: String) {
        let token = SecretString::from(token);
        match self {
            ApplicationConfig::Gitlab(config) => config.token = token,
            ApplicationConfig::Mattermost(config) => config.token = token,
        }
    }

    pub async fn connector(&self, policy: DecodePolicy) -> SyncResult<Box<dyn ApplicationConnector>> {
        let connector: Box<dyn ApplicationConnector> = match self {
            ApplicationConfig::Gitlab(config) => Box::new(GitLabConnector::new(config, policy).await?),
            ApplicationConfig::Mattermost(config) => {
                Box::new(MattermostConnector::new(config, policy).await?)
            }
        };
        Ok(connector)
    }
}

/// Each kind may be configured once, since its id keys audit events and
/// the write-back attribute.
pub fn validate_all(applications: &[ApplicationConfig]) -> SyncResult<()> {
    let mut seen = BTreeSet::new();
    for app in applications {
        if !seen.insert(app.id()) {
            return Err(SyncError::Config(format!(
                "application '{}' is configured more than once",
                app.id()
            )));
        }
        app.validate()?;
    }
    Ok(())
}

/// Build a connector for every configured application, in file order.
pub async fn build_connectors(
    applications: &[ApplicationConfig],
    policy: DecodePolicy,
) -> SyncResult<Vec<Box<dyn ApplicationConnector>>> {
    let mut connectors = Vec::with_capacity(applications.len());
    for app in applications {
        let connector = app.connector(policy).await?;
        info!(application = connector.id(), name = connector.display_name(), "Connector ready");
        connectors.push(connector);
    }
    Ok(connectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const APPS: &str = r#"
- kind: gitlab
  server_url: https://git.example
  token: glpat-1
  excluded_users: root
- kind: mattermost
  server_url: https://chat.example
  token: mm-1
  global_team: everyone
"#;

    fn parse(yaml: &str) -> Vec<ApplicationConfig> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_tagged_entries() {
        let apps = parse(APPS);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].id(), "gitlab");
        assert_eq!(apps[1].id(), "mattermost");
        match &apps[1] {
            ApplicationConfig::Mattermost(config) => {
                assert_eq!(config.global_team.as_deref(), Some("everyone"));
                assert_eq!(config.client.per_page, 100);
            }
            ApplicationConfig::Gitlab(_) => panic!("expected mattermost"),
        }
        assert!(validate_all(&apps).is_ok());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: Result<Vec<ApplicationConfig>, _> =
            serde_yaml::from_str("- kind: jira\n  server_url: https://jira.example\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let apps = parse(
            r#"
- kind: gitlab
  server_url: https://git.example
  token: a
- kind: gitlab
  server_url: https://other.example
  token: b
"#,
        );
        assert!(matches!(validate_all(&apps), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_set_token() {
        let mut apps = parse(APPS);
        apps[0].set_token("glpat-env".into());
        match &apps[0] {
            ApplicationConfig::Gitlab(config) => assert_eq!(config.token.expose_secret(), "glpat-env"),
            ApplicationConfig::Mattermost(_) => panic!("expected gitlab"),
        }
    }

    #[tokio::test]
    async fn test_build_connectors_in_order() {
        let connectors = build_connectors(&parse(APPS), DecodePolicy::SkipAndWarn)
            .await
            .unwrap();
        let ids: Vec<_> = connectors.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["gitlab", "mattermost"]);
        assert_eq!(connectors[1].organization_type(), "team");
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_pattern() {
        let mut apps = parse(APPS);
        if let ApplicationConfig::Gitlab(config) = &mut apps[0] {
            config.group_pattern = "^APP_(".into();
        }
        assert!(build_connectors(&apps, DecodePolicy::SkipAndWarn).await.is_err());
    }
}
