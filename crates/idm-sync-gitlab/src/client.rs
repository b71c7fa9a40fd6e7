//! Typed GitLab REST v4 calls.
//!
//! Listings follow `Link` headers. Every call returns `None` / `false` when it
//! could not be completed after the rate-limit retry.

use idm_sync_core::{AuthScheme, ClientConfig, RestClient, SyncResult};
use reqwest::Method;
use secrecy::SecretString;
use serde::de::IgnoredAny;
use tracing::{debug, info};

use crate::model::{GLGroup, GLProject, GLUser};
use crate::permission::GLPermission;

const API_PATH: &str = "/api/v4";

#[derive(Debug)]
pub struct GitLabClient {
    rest: RestClient,
}

impl GitLabClient {
    pub async fn new(config: &ClientConfig, token: SecretString) -> SyncResult<Self> {
        let rest = RestClient::new("gitlab", config, API_PATH)?;
        rest.authorize(AuthScheme::PrivateToken(token)).await;
        Ok(Self { rest })
    }

    fn search(search: Option<&str>) -> Vec<(&'static str, String)> {
        search
            .filter(|s| !s.is_empty())
            .map(|s| vec![("search", s.to_string())])
            .unwrap_or_default()
    }

    pub async fn get_users(&self, search: Option<&str>) -> Option<Vec<GLUser>> {
        debug!(search, "Retrieving users");
        self.rest.get_list_linked("/users", &Self::search(search)).await
    }

    pub async fn get_groups(&self, search: Option<&str>, with_statistics: bool) -> Option<Vec<GLGroup>> {
        debug!(search, with_statistics, "Retrieving groups");
        let mut query = vec![("statistics", with_statistics.to_string())];
        query.extend(Self::search(search));
        self.rest.get_list_linked("/groups", &query).await
    }

    pub async fn get_group_members(&self, group: &GLGroup) -> Option<Vec<GLUser>> {
        debug!(group = %group.path, "Retrieving group members");
        self.rest
            .get_list_linked(&format!("/groups/{}/members", group.id), &[])
            .await
    }

    pub async fn add_member_to_group(&self, group: &GLGroup, user: &GLUser, permission: GLPermission) -> bool {
        info!(username = %user.username, group = %group.path, %permission, "Adding user to group");
        self.rest
            .send::<()>(
                Method::POST,
                &format!("/groups/{}/members", group.id),
                &[
                    ("user_id", user.id.to_string()),
                    ("access_level", permission.access_level().to_string()),
                ],
                None,
            )
            .await
    }

    pub async fn remove_member_from_group(&self, group: &GLGroup, user: &GLUser) -> bool {
        info!(username = %user.username, group = %group.path, "Removing user from group");
        self.rest
            .delete(&format!("/groups/{}/members/{}", group.id, user.id), &[])
            .await
    }

    pub async fn create_group(&self, path: &str, name: &str) -> Option<GLGroup> {
        info!(path, name, "Creating group");
        let name = if name.is_empty() { path } else { name };
        self.rest
            .post_query(
                "/groups",
                &[
                    ("path", path.to_string()),
                    ("name", name.to_string()),
                    ("request_access_enabled", "false".to_string()),
                    ("share_with_group_lock", "false".to_string()),
                ],
            )
            .await
    }

    /// Create an account with a random password, linked to `provider` when
    /// both provider and uid are given.
    pub async fn create_user(
        &self,
        username: &str,
        name: &str,
        email: &str,
        provider: Option<(&str, &str)>,
    ) -> Option<GLUser> {
        info!(username, name, email, "Creating user");
        let mut query = vec![
            ("username", username.to_string()),
            ("name", name.to_string()),
            ("email", email.to_string()),
            ("password", uuid::Uuid::new_v4().to_string()),
            ("skip_confirmation", "true".to_string()),
        ];
        if let Some((provider, extern_uid)) = provider.filter(|(p, u)| !p.is_empty() && !u.is_empty()) {
            query.push(("provider", provider.to_string()));
            query.push(("extern_uid", extern_uid.to_lowercase()));
        }
        self.rest.post_query("/users", &query).await
    }

    pub async fn block_user(&self, user: &GLUser) -> bool {
        info!(username = %user.username, id = user.id, "Blocking user");
        self.rest
            .send::<()>(Method::POST, &format!("/users/{}/block", user.id), &[], None)
            .await
    }

    pub async fn unblock_user(&self, user: &GLUser) -> bool {
        info!(username = %user.username, id = user.id, "Unblocking user");
        self.rest
            .send::<()>(Method::POST, &format!("/users/{}/unblock", user.id), &[], None)
            .await
    }

    pub async fn activate_user(&self, user: &GLUser) -> bool {
        info!(username = %user.username, id = user.id, "Activating user");
        self.rest
            .send::<()>(Method::POST, &format!("/users/{}/activate", user.id), &[], None)
            .await
    }

    pub async fn add_identity_to_user(&self, user: &GLUser, provider: &str, extern_uid: &str) -> bool {
        info!(username = %user.username, id = user.id, provider, extern_uid, "Adding identity to user");
        self.rest
            .put_query::<IgnoredAny>(
                &format!("/users/{}", user.id),
                &[
                    ("provider", provider.to_string()),
                    ("extern_uid", extern_uid.to_lowercase()),
                ],
            )
            .await
            .is_some()
    }

    pub async fn delete_user(&self, user: &GLUser, hard: bool) -> bool {
        info!(username = %user.username, id = user.id, "Deleting user");
        self.rest
            .delete(&format!("/users/{}", user.id), &[("hard_delete", hard.to_string())])
            .await
    }

    pub async fn get_projects_from_group(&self, group: &GLGroup) -> Option<Vec<GLProject>> {
        debug!(group = %group.path, "Retrieving projects of group");
        self.rest
            .get_list_linked(&format!("/groups/{}/projects", group.id), &[])
            .await
    }

    pub async fn get_project_users(&self, project: &GLProject) -> Option<Vec<GLUser>> {
        debug!(project = %project.path, "Retrieving project users");
        self.rest
            .get_list_linked(&format!("/projects/{}/users", project.id), &[])
            .await
    }

    pub async fn remove_member_from_project(&self, project: &GLProject, user: &GLUser) -> bool {
        info!(username = %user.username, project = %project.path, "Removing user from project");
        self.rest
            .delete(&format!("/projects/{}/members/{}", project.id, user.id), &[])
            .await
    }
}
