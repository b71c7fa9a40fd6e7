//! GitLab reconciliation.
//!
//! A pass first converges the GitLab accounts (temporary account cleanup,
//! unblock, create, block) and then the memberships of every top-level
//! group. Single failed calls are logged by the client and skipped here.

use async_trait::async_trait;
use idm_sync_core::{
    AppStatistics, ApplicationConnector, DecodePolicy, DesiredUnit, DirectoryGroup,
    DirectorySnapshot, EventSink, GroupNameDecoder, GroupRole, OrganizationRole, PermissionOrder,
    SsoProvider, SyncError, SyncResult, TargetState, TargetStateBuilder,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, instrument, warn};

use crate::client::GitLabClient;
use crate::config::GitLabConfig;
use crate::events;
use crate::model::{GLGroup, GLState, GLUser, LiveGroup};
use crate::permission::GLPermission;
use crate::{APPLICATION_ID, USER_ID_ATTRIBUTE};

/// Accounts taking part in membership reconciliation, keyed by username.
type SyncedUsers = BTreeMap<String, GLUser>;

pub struct GitLabConnector {
    client: GitLabClient,
    decoder: GroupNameDecoder,
    group_search: Option<String>,
    excluded: BTreeSet<String>,
    provider: Option<SsoProvider>,
    remove_project_members: bool,
}

impl std::fmt::Debug for GitLabConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabConnector")
            .field("pattern", &self.decoder.pattern())
            .field("group_search", &self.group_search)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

impl GitLabConnector {
    pub async fn new(config: &GitLabConfig, policy: DecodePolicy) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            client: GitLabClient::new(&config.client, config.token.clone()).await?,
            decoder: config.decoder(policy)?,
            group_search: config.group_search.clone().filter(|s| !s.is_empty()),
            excluded: config.excluded(),
            provider: config.provider.clone(),
            remove_project_members: config.remove_project_members,
        })
    }

    fn decode(&self, group: &DirectoryGroup) -> SyncResult<Option<OrganizationRole<GLPermission>>> {
        let Some(decoded) = self.decoder.decode(&group.name)? else {
            return Ok(None);
        };
        let role = decoded.role.unwrap_or_default();
        let permission = GLPermission::from_name(&role).ok_or_else(|| SyncError::UnknownPermission {
            application: APPLICATION_ID.to_string(),
            value: role.clone(),
        })?;
        debug!(group = %group.name, path = %decoded.unit, %permission, "Extracted GitLab group");
        Ok(Some(OrganizationRole::new(decoded.unit, permission)))
    }

    /// Excluded users, admins and bots are never blocked or removed.
    fn is_protected(&self, user: &GLUser) -> bool {
        self.excluded.contains(&user.username) || user.is_admin || user.is_bot()
    }

    fn write_back_id(snapshot: &mut DirectorySnapshot, directory_id: &str, user: &GLUser) {
        if let Some(directory_user) = snapshot.user_mut(directory_id) {
            if directory_user.set_attribute(USER_ID_ATTRIBUTE, &user.id.to_string()) {
                debug!(username = %user.username, id = user.id, "Stored GitLab user id in directory user");
            }
        }
    }

    /// Delete temporary accounts and move their identities onto the primary
    /// account. Returns the remaining accounts.
    async fn remove_temporary_users(&self, users: Vec<GLUser>, sink: &dyn EventSink) -> Vec<GLUser> {
        let (temporary, mut users): (Vec<_>, Vec<_>) =
            users.into_iter().partition(GLUser::has_temporary_email);

        for temp in temporary {
            if !self.client.delete_user(&temp, true).await {
                continue;
            }
            sink.publish(events::user_deleted(&temp));
            let Some(primary_username) = temp.primary_username() else {
                continue;
            };
            let Some(primary) = users.iter_mut().find(|u| u.username == primary_username) else {
                warn!(username = %temp.username, "No primary user found for deleted temporary user");
                continue;
            };
            for identity in &temp.identities {
                if self
                    .client
                    .add_identity_to_user(primary, &identity.provider, &identity.extern_uid)
                    .await
                {
                    let extern_uid = identity.extern_uid.to_lowercase();
                    sink.publish(events::identity_added(primary, &extern_uid));
                    primary.identities.push(identity.clone());
                }
            }
        }
        users
    }

    #[instrument(skip_all)]
    async fn sync_users(
        &self,
        snapshot: &mut DirectorySnapshot,
        target: &TargetState<GLPermission>,
        sink: &dyn EventSink,
    ) -> Option<SyncedUsers> {
        let Some(users) = self.client.get_users(None).await else {
            error!("Could not retrieve GitLab users");
            return None;
        };
        let users = self.remove_temporary_users(users, sink).await;
        let existing: BTreeSet<String> = users.iter().map(|u| u.username.clone()).collect();
        let mut synced = SyncedUsers::new();
        let mut unclaimed = Vec::new();

        for mut user in users {
            let Some(desired) = target.users.get(&user.username) else {
                unclaimed.push(user);
                continue;
            };
            match user.state {
                GLState::Blocked => {
                    if !self.client.unblock_user(&user).await {
                        continue;
                    }
                    sink.publish(events::user_unblocked(&user));
                    user.state = GLState::Active;
                }
                GLState::Deactivated => {
                    if !self.client.activate_user(&user).await {
                        continue;
                    }
                    sink.publish(events::user_unblocked(&user));
                    user.state = GLState::Active;
                }
                GLState::LdapBlocked => {
                    warn!(username = %user.username, "User is blocked by LDAP and cannot be unblocked");
                }
                GLState::Active | GLState::Other => {}
            }
            Self::write_back_id(snapshot, &desired.directory_id, &user);
            synced.insert(user.username.clone(), user);
        }

        for desired in target.users.values() {
            if existing.contains(&desired.username) {
                continue;
            }
            let provider = self.provider.as_ref().map(|p| p.name.as_str());
            let extern_uid = desired.external_uid.as_deref().unwrap_or_default();
            if let Some(provider) = provider.filter(|_| extern_uid.is_empty()) {
                warn!(
                    username = %desired.username,
                    provider,
                    "New user not created, missing required external user id"
                );
                continue;
            }
            let Some(email) = desired.email.as_deref() else {
                warn!(username = %desired.username, "New user not created, missing required email address");
                continue;
            };
            let name = if desired.name.is_empty() {
                desired.username.as_str()
            } else {
                desired.name.as_str()
            };
            let Some(user) = self
                .client
                .create_user(&desired.username, name, email, provider.map(|p| (p, extern_uid)))
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
                if !self.client.block_user(&user).await {
                    continue;
                }
                sink.publish(events::user_blocked(&user));
                user.state = GLState::Blocked;
            }
            synced.insert(user.username.clone(), user);
        }

        info!(synced = synced.len(), "Synced GitLab users");
        Some(synced)
    }

    /// Top-level groups with their current members. Fails as a whole if any
    /// member listing fails, so that no group is mistaken for a missing one.
    async fn live_groups(&self) -> Option<Vec<LiveGroup>> {
        let groups = self.client.get_groups(None, false).await?;
        let mut live = Vec::new();
        for group in groups.into_iter().filter(|g| !g.is_subgroup()) {
            let members = self.client.get_group_members(&group).await?;
            live.push(LiveGroup::new(group, members));
        }
        Some(live)
    }

    #[instrument(skip_all)]
    async fn sync_groups(
        &self,
        target: &TargetState<GLPermission>,
        synced: &SyncedUsers,
        sink: &dyn EventSink,
    ) -> bool {
        let Some(live_groups) = self.live_groups().await else {
            error!("Could not retrieve GitLab groups");
            return false;
        };

        let mut unmatched = Vec::new();
        let mut seen = BTreeSet::new();
        for mut live in live_groups {
            let Some(desired) = target.units.get(&live.group.path) else {
                unmatched.push(live);
                continue;
            };
            seen.insert(live.group.path.clone());
            self.sync_group_members(&mut live, desired, synced, sink).await;
            if self.remove_project_members {
                self.sync_projects(&live, sink).await;
            }
        }

        for desired in target.units.values().filter(|u| !seen.contains(&u.name)) {
            let Some(group) = self.client.create_group(&desired.name, &desired.name).await else {
                continue;
            };
            sink.publish(events::group_created(&group));
            for member in desired.members() {
                let Some(user) = synced.get(&member.username) else {
                    continue;
                };
                if self.client.add_member_to_group(&group, user, member.permission).await {
                    sink.publish(events::user_added_to_group(user, &group, member.permission));
                }
            }
        }

        for live in unmatched {
            for member in live.members.values().filter(|m| !self.is_protected(m)) {
                if self.client.remove_member_from_group(&live.group, member).await {
                    sink.publish(events::user_removed_from_group(member, &live.group));
                }
            }
        }
        true
    }

    async fn sync_group_members(
        &self,
        live: &mut LiveGroup,
        desired: &DesiredUnit<GLPermission>,
        synced: &SyncedUsers,
        sink: &dyn EventSink,
    ) {
        for member in desired.members() {
            let Some(user) = synced.get(&member.username) else {
                continue;
            };
            if self.is_protected(user) {
                continue;
            }
            let current = live.members.get(&user.username);
            if current.and_then(GLUser::permission) == Some(member.permission) {
                continue;
            }
            if current.is_some() {
                if !self.client.remove_member_from_group(&live.group, user).await {
                    continue;
                }
                sink.publish(events::user_removed_from_group(user, &live.group));
                live.members.remove(&user.username);
            }
            if self.client.add_member_to_group(&live.group, user, member.permission).await {
                sink.publish(events::user_added_to_group(user, &live.group, member.permission));
                let mut added = user.clone();
                added.access_level = Some(member.permission.access_level());
                live.members.insert(added.username.clone(), added);
            }
        }

        let stale: Vec<GLUser> = live
            .members
            .values()
            .filter(|m| !self.is_protected(m))
            .filter(|m| {
                synced
                    .get(&m.username)
                    .map_or(m.is_blocked(), GLUser::is_blocked)
                    || !desired.contains(&m.username)
            })
            .cloned()
            .collect();
        for member in stale {
            if self.client.remove_member_from_group(&live.group, &member).await {
                sink.publish(events::user_removed_from_group(&member, &live.group));
                live.members.remove(&member.username);
            }
        }
    }

    /// Remove project members that are not members of the parent group.
    async fn sync_projects(&self, live: &LiveGroup, sink: &dyn EventSink) {
        let Some(projects) = self.client.get_projects_from_group(&live.group).await else {
            return;
        };
        for project in projects {
            debug!(project = %project.path, "Syncing project members");
            let Some(users) = self.client.get_project_users(&project).await else {
                continue;
            };
            for user in users
                .iter()
                .filter(|u| !self.is_protected(u) && !live.is_member(&u.username))
            {
                warn!(
                    username = %user.username,
                    project = %project.path,
                    group = %live.group.path,
                    "Removing project member who is not a member of the group"
                );
                if self.client.remove_member_from_project(&project, user).await {
                    sink.publish(events::user_removed_from_project(user, &project));
                }
            }
        }
    }
}

#[async_trait]
impl ApplicationConnector for GitLabConnector {
    fn id(&self) -> &'static str {
        APPLICATION_ID
    }

    fn display_name(&self) -> &str {
        "GitLab"
    }

    fn organization_type(&self) -> &'static str {
        "group"
    }

    fn group_search_filter(&self) -> Option<&str> {
        self.group_search.as_deref()
    }

    fn decode_group(&self, group: &DirectoryGroup) -> Option<GroupRole> {
        match self.decode(group) {
            Ok(Some(role)) => Some(GroupRole::new(role.unit, role.permission.as_str())),
            Ok(None) => None,
            Err(e) => {
                warn!(group = %group.name, error = %e, "Group not usable for GitLab");
                None
            }
        }
    }

    #[instrument(skip_all, fields(application = APPLICATION_ID))]
    async fn sync(&self, snapshot: &mut DirectorySnapshot, sink: &dyn EventSink) -> SyncResult<bool> {
        let target = TargetStateBuilder::new()
            .uid_attribute(self.provider.as_ref().map(|p| p.uid_attribute.as_str()))
            .build(snapshot, |group| self.decode(group))?;
        debug!(groups = target.units.len(), users = target.users.len(), "Built GitLab target state");

        let Some(synced) = self.sync_users(snapshot, &target, sink).await else {
            return Ok(false);
        };
        Ok(self.sync_groups(&target, &synced, sink).await)
    }

    async fn statistics(&self) -> Option<Vec<AppStatistics>> {
        let groups: Vec<GLGroup> = self.client.get_groups(None, true).await?;
        let mut statistics = Vec::new();
        for group in groups.into_iter().filter(|g| !g.is_subgroup()) {
            let members = self
                .client
                .get_group_members(&group)
                .await
                .map_or(0, |m| m.len());
            let mut stats = AppStatistics::new(&group.name).with("members", members);
            for (key, value) in group.statistics.iter().flatten() {
                if value.is_number() {
                    stats = stats.with(key, value);
                }
            }
            statistics.push(stats);
        }
        Some(statistics)
    }
}
