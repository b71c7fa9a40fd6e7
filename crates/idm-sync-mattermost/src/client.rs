//! Typed Mattermost REST v4 calls. Listings are paged by page number.

use idm_sync_core::{AuthScheme, ClientConfig, OffsetStyle, RestClient, SyncResult};
use reqwest::Method;
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, info};

use crate::model::{MMChannel, MMChannelMember, MMTeam, MMTeamMember, MMUser};
use crate::role::MMRole;

const API_PATH: &str = "/api/v4";

#[derive(Debug)]
pub struct MattermostClient {
    rest: RestClient,
}

impl MattermostClient {
    pub async fn new(config: &ClientConfig, token: SecretString) -> SyncResult<Self> {
        let rest = RestClient::new("mattermost", config, API_PATH)?;
        rest.authorize(AuthScheme::Bearer(token)).await;
        Ok(Self { rest })
    }

    pub async fn get_users(&self) -> Option<Vec<MMUser>> {
        debug!("Retrieving users");
        self.rest.get_list_offset("/users", &[], OffsetStyle::PAGE).await
    }

    pub async fn get_teams(&self) -> Option<Vec<MMTeam>> {
        debug!("Retrieving teams");
        self.rest.get_list_offset("/teams", &[], OffsetStyle::PAGE).await
    }

    pub async fn get_team_members(&self, team: &MMTeam) -> Option<Vec<MMTeamMember>> {
        debug!(team = %team.name, "Retrieving team members");
        self.rest
            .get_list_offset(&format!("/teams/{}/members", team.id), &[], OffsetStyle::PAGE)
            .await
    }

    pub async fn get_team_channels(&self, team: &MMTeam) -> Option<Vec<MMChannel>> {
        debug!(team = %team.name, "Retrieving team channels");
        self.rest
            .get_list_offset(&format!("/teams/{}/channels", team.id), &[], OffsetStyle::PAGE)
            .await
    }

    pub async fn get_channel_members(&self, channel: &MMChannel) -> Option<Vec<MMChannelMember>> {
        debug!(channel = %channel.name, "Retrieving channel members");
        self.rest
            .get_list_offset(&format!("/channels/{}/members", channel.id), &[], OffsetStyle::PAGE)
            .await
    }

    pub async fn create_user(
        &self,
        username: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        auth: Option<(&str, &str)>,
    ) -> Option<MMUser> {
        info!(username, first_name, last_name, email, "Creating user");
        let mut body = json!({
            "email": email,
            "username": username,
            "first_name": first_name,
            "last_name": last_name,
        });
        if let Some((service, data)) = auth.filter(|(s, d)| !s.is_empty() && !d.is_empty()) {
            body["auth_service"] = json!(service);
            body["auth_data"] = json!(data);
        }
        self.rest.post_json("/users", &[], &body).await
    }

    pub async fn update_user_active_status(&self, user: &MMUser, active: bool) -> bool {
        info!(username = %user.username, id = %user.id, active, "Updating user active state");
        self.rest
            .send(
                Method::PUT,
                &format!("/users/{}/active", user.id),
                &[],
                Some(&json!({ "active": active })),
            )
            .await
    }

    pub async fn create_team(&self, name: &str, display_name: &str) -> Option<MMTeam> {
        info!(name, "Creating team");
        let display_name = if display_name.is_empty() { name } else { display_name };
        self.rest
            .post_json(
                "/teams",
                &[],
                &json!({ "name": name, "display_name": display_name, "type": "I" }),
            )
            .await
    }

    /// Add `user` to `team`; new members always join as team user.
    pub async fn add_member_to_team(&self, team: &MMTeam, user: &MMUser) -> bool {
        info!(username = %user.username, team = %team.name, role = %MMRole::TeamUser, "Adding user to team");
        self.rest
            .send(
                Method::POST,
                &format!("/teams/{}/members", team.id),
                &[],
                Some(&json!({ "team_id": team.id, "user_id": user.id })),
            )
            .await
    }

    pub async fn update_team_member_role(&self, team: &MMTeam, user: &MMUser, role: MMRole) -> bool {
        info!(username = %user.username, team = %team.name, %role, "Updating team member role");
        self.rest
            .send(
                Method::PUT,
                &format!("/teams/{}/members/{}/roles", team.id, user.id),
                &[],
                Some(&json!({ "roles": role.roles_value() })),
            )
            .await
    }

    pub async fn remove_member_from_team(&self, team: &MMTeam, user: &MMUser) -> bool {
        info!(username = %user.username, team = %team.name, "Removing user from team");
        self.rest
            .delete(&format!("/teams/{}/members/{}", team.id, user.id), &[])
            .await
    }

    pub async fn remove_member_from_channel(&self, channel: &MMChannel, user: &MMUser) -> bool {
        info!(username = %user.username, channel = %channel.name, "Removing user from channel");
        self.rest
            .delete(&format!("/channels/{}/members/{}", channel.id, user.id), &[])
            .await
    }
}
