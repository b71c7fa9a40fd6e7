//! Mattermost reconciliation.

use async_trait::async_trait;
use idm_sync_core::{
    AppStatistics, ApplicationConnector, DecodePolicy, DesiredUnit, DirectoryGroup,
    DirectorySnapshot, EventSink, GroupNameDecoder, GroupRole, OrganizationRole, SsoProvider,
    SyncResult, TargetState, TargetStateBuilder,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, instrument, warn};

use crate::client::MattermostClient;
use crate::config::MattermostConfig;
use crate::events;
use crate::model::{LiveTeam, MMChannel, MMUser, TeamMember};
use crate::role::MMRole;
use crate::{APPLICATION_ID, USER_ID_ATTRIBUTE};

type SyncedUsers = BTreeMap<String, MMUser>;

pub struct MattermostConnector {
    client: MattermostClient,
    decoder: GroupNameDecoder,
    group_search: Option<String>,
    excluded: BTreeSet<String>,
    provider: Option<SsoProvider>,
    remove_channel_members: bool,
    global_team: Option<String>,
}

impl std::fmt::Debug for MattermostConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostConnector")
            .field("pattern", &self.decoder.pattern())
            .field("group_search", &self.group_search)
            .field("global_team", &self.global_team)
            .finish_non_exhaustive()
    }
}

impl MattermostConnector {
    pub async fn new(config: &MattermostConfig, policy: DecodePolicy) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            client: MattermostClient::new(&config.client, config.token.clone()).await?,
            decoder: config.decoder(policy)?,
            group_search: config.group_search.clone().filter(|s| !s.is_empty()),
            excluded: config.excluded(),
            provider: config.provider.clone(),
            remove_channel_members: config.remove_channel_members,
            global_team: config.global_team.clone().filter(|t| !t.is_empty()),
        })
    }

    fn decode(&self, group: &DirectoryGroup) -> SyncResult<Option<OrganizationRole<MMRole>>> {
        let Some(decoded) = self.decoder.decode(&group.name)? else {
            return Ok(None);
        };
        let role = if decoded.flag {
            MMRole::TeamAdmin
        } else {
            MMRole::TeamUser
        };
        debug!(group = %group.name, team = %decoded.unit, %role, "Extracted Mattermost team");
        Ok(Some(OrganizationRole::new(decoded.unit, role)))
    }

    fn is_protected(&self, user: &MMUser) -> bool {
        self.excluded.contains(&user.username) || user.is_admin() || user.is_bot
    }

    fn write_back_id(snapshot: &mut DirectorySnapshot, directory_id: &str, user: &MMUser) {
        if let Some(directory_user) = snapshot.user_mut(directory_id) {
            if directory_user.set_attribute(USER_ID_ATTRIBUTE, &user.id) {
                debug!(username = %user.username, id = %user.id, "Stored Mattermost user id in directory user");
            }
        }
    }

    #[instrument(skip_all)]
    async fn sync_users(
        &self,
        snapshot: &mut DirectorySnapshot,
        target: &TargetState<MMRole>,
        sink: &dyn EventSink,
    ) -> Option<SyncedUsers> {
        let Some(users) = self.client.get_users().await else {
            error!("Could not retrieve Mattermost users");
            return None;
        };
        let existing: BTreeSet<String> = users.iter().map(|u| u.username.clone()).collect();
        let mut synced = SyncedUsers::new();
        let mut unclaimed = Vec::new();

        for mut user in users {
            let Some(desired) = target.users.get(&user.username) else {
                unclaimed.push(user);
                continue;
            };
            if !user.is_active() {
                if !self.client.update_user_active_status(&user, true).await {
                    continue;
                }
                sink.publish(events::user_activated(&user));
                user.delete_at = 0;
            }
            Self::write_back_id(snapshot, &desired.directory_id, &user);
            synced.insert(user.username.clone(), user);
        }

        for desired in target.users.values().filter(|u| !existing.contains(&u.username)) {
            let auth_service = self.provider.as_ref().map(|p| p.name.as_str());
            let auth_data = desired.external_uid.as_deref().unwrap_or_default();
            if let Some(service) = auth_service.filter(|_| auth_data.is_empty()) {
                warn!(
                    username = %desired.username,
                    service,
                    "New user not created, missing required authentication data"
                );
                continue;
            }
            let Some(email) = desired.email.as_deref() else {
                warn!(username = %desired.username, "New user not created, missing required email address");
                continue;
            };
            let Some(user) = self
                .client
                .create_user(
                    &desired.username,
                    &desired.first_name,
                    &desired.last_name,
                    email,
                    auth_service.map(|s| (s, auth_data)),
                )
                .await
            else {
                continue;
            };
            sink.publish(events::user_created(&user));
            Self::write_back_id(snapshot, &desired.directory_id, &user);
            synced.insert(user.username.clone(), user);
        }

        for mut user in unclaimed {
            if self.is_protected(&user) {
                continue;
            }
            if user.is_active() {
                if !self.client.update_user_active_status(&user, false).await {
                    continue;
                }
                sink.publish(events::user_deactivated(&user));
                user.delete_at = 1;
            }
            synced.insert(user.username.clone(), user);
        }

        info!(synced = synced.len(), "Synced Mattermost users");
        Some(synced)
    }

    /// Teams with their members, resolved against the current accounts.
    async fn live_teams(&self) -> Option<(Vec<LiveTeam>, BTreeMap<String, MMUser>)> {
        let teams = self.client.get_teams().await?;
        let users_by_id: BTreeMap<String, MMUser> = self
            .client
            .get_users()
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        let mut live = Vec::new();
        for team in teams {
            let members = self.client.get_team_members(&team).await?;
            live.push(LiveTeam::new(team, members, &users_by_id));
        }
        Some((live, users_by_id))
    }

    #[instrument(skip_all)]
    async fn sync_teams(
        &self,
        target: &TargetState<MMRole>,
        synced: &SyncedUsers,
        sink: &dyn EventSink,
    ) -> bool {
        let Some((live_teams, users_by_id)) = self.live_teams().await else {
            error!("Could not retrieve Mattermost teams");
            return false;
        };

        let mut unmatched = Vec::new();
        let mut seen = BTreeSet::new();
        for mut live in live_teams {
            let Some(desired) = target.units.get(&live.team.name) else {
                unmatched.push(live);
                continue;
            };
            seen.insert(live.team.name.clone());
            self.sync_team_members(&mut live, desired, synced, sink).await;
            if self.remove_channel_members {
                self.sync_channels(&live, &users_by_id, sink).await;
            }
        }

        for desired in target.units.values().filter(|u| !seen.contains(&u.name)) {
            let Some(team) = self.client.create_team(&desired.name, &desired.name).await else {
                continue;
            };
            sink.publish(events::team_created(&team));
            for member in desired.members() {
                let Some(user) = synced.get(&member.username) else {
                    continue;
                };
                if !self.client.add_member_to_team(&team, user).await {
                    continue;
                }
                sink.publish(events::user_added_to_team(user, &team));
                if member.permission != MMRole::TeamUser
                    && self
                        .client
                        .update_team_member_role(&team, user, member.permission)
                        .await
                {
                    sink.publish(events::user_role_updated_in_team(user, &team, member.permission));
                }
            }
        }

        for live in unmatched {
            for member in live.members.values().filter(|m| !self.is_protected(&m.user)) {
                if self.client.remove_member_from_team(&live.team, &member.user).await {
                    sink.publish(events::user_removed_from_team(&member.user, &live.team));
                }
            }
        }
        true
    }

    async fn sync_team_members(
        &self,
        live: &mut LiveTeam,
        desired: &DesiredUnit<MMRole>,
        synced: &SyncedUsers,
        sink: &dyn EventSink,
    ) {
        for member in desired.members() {
            let Some(user) = synced.get(&member.username) else {
                continue;
            };
            if !live.members.contains_key(&user.username) {
                if !self.client.add_member_to_team(&live.team, user).await {
                    continue;
                }
                sink.publish(events::user_added_to_team(user, &live.team));
                live.members.insert(
                    user.username.clone(),
                    TeamMember {
                        user: user.clone(),
                        role: MMRole::TeamUser,
                    },
                );
            }
            let Some(current) = live.members.get_mut(&user.username) else {
                continue;
            };
            if current.role != member.permission
                && self
                    .client
                    .update_team_member_role(&live.team, user, member.permission)
                    .await
            {
                sink.publish(events::user_role_updated_in_team(user, &live.team, member.permission));
                current.role = member.permission;
            }
        }

        let stale: Vec<MMUser> = live
            .members
            .values()
            .filter(|m| !self.is_protected(&m.user))
            .filter(|m| {
                !m.user.is_active()
                    || synced.get(&m.user.username).is_some_and(|u| !u.is_active())
                    || !desired.contains(&m.user.username)
            })
            .map(|m| m.user.clone())
            .collect();
        for user in stale {
            if self.client.remove_member_from_team(&live.team, &user).await {
                sink.publish(events::user_removed_from_team(&user, &live.team));
                live.members.remove(&user.username);
            }
        }
    }

    /// Remove channel members that are not members of the team.
    async fn sync_channels(
        &self,
        live: &LiveTeam,
        users_by_id: &BTreeMap<String, MMUser>,
        sink: &dyn EventSink,
    ) {
        let Some(channels) = self.client.get_team_channels(&live.team).await else {
            return;
        };
        for channel in channels {
            let Some(members) = self.client.get_channel_members(&channel).await else {
                continue;
            };
            for user in members
                .iter()
                .filter(|m| !live.has_member_id(&m.user_id))
                .filter_map(|m| users_by_id.get(&m.user_id))
                .filter(|u| !self.is_protected(u))
            {
                warn!(
                    username = %user.username,
                    channel = %channel.name,
                    team = %live.team.name,
                    "Removing channel member who is not a member of the team"
                );
                if self.client.remove_member_from_channel(&channel, user).await {
                    sink.publish(events::user_removed_from_channel(user, &channel));
                }
            }
        }
    }
}

/// The first channel with the highest message count, if any has messages.
fn busiest_channel(channels: &[MMChannel]) -> Option<&MMChannel> {
    channels
        .iter()
        .fold(None, |best: Option<&MMChannel>, c| match best {
            Some(b) if b.total_msg_count >= c.total_msg_count => Some(b),
            _ => Some(c),
        })
        .filter(|c| c.total_msg_count > 0)
}

#[async_trait]
impl ApplicationConnector for MattermostConnector {
    fn id(&self) -> &'static str {
        APPLICATION_ID
    }

    fn display_name(&self) -> &str {
        "Mattermost"
    }

    fn organization_type(&self) -> &'static str {
        "team"
    }

    fn group_search_filter(&self) -> Option<&str> {
        self.group_search.as_deref()
    }

    fn decode_group(&self, group: &DirectoryGroup) -> Option<GroupRole> {
        match self.decode(group) {
            Ok(Some(role)) => Some(GroupRole::new(role.unit, role.permission.as_str())),
            Ok(None) => None,
            Err(e) => {
                warn!(group = %group.name, error = %e, "Group not usable for Mattermost");
                None
            }
        }
    }

    #[instrument(skip_all, fields(application = APPLICATION_ID))]
    async fn sync(&self, snapshot: &mut DirectorySnapshot, sink: &dyn EventSink) -> SyncResult<bool> {
        let target = TargetStateBuilder::new()
            .uid_attribute(self.provider.as_ref().map(|p| p.uid_attribute.as_str()))
            .global_team(self.global_team.as_deref())
            .build(snapshot, |group| self.decode(group))?;
        debug!(teams = target.units.len(), users = target.users.len(), "Built Mattermost target state");

        let Some(synced) = self.sync_users(snapshot, &target, sink).await else {
            return Ok(false);
        };
        Ok(self.sync_teams(&target, &synced, sink).await)
    }

    async fn statistics(&self) -> Option<Vec<AppStatistics>> {
        let teams = self.client.get_teams().await?;
        let mut statistics = Vec::new();
        for team in teams {
            let members = self
                .client
                .get_team_members(&team)
                .await
                .map_or(0, |m| m.len());
            let channels = self.client.get_team_channels(&team).await.unwrap_or_default();
            let messages: u64 = channels.iter().map(|c| c.total_msg_count).sum();
            statistics.push(
                AppStatistics::new(&team.name)
                    .with("members", members)
                    .with("channels", channels.len())
                    .with(
                        "channel_with_most_messages",
                        busiest_channel(&channels).map_or("", |c| c.name.as_str()),
                    )
                    .with("messages", messages),
            );
        }
        Some(statistics)
    }
}
