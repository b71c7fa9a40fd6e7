//! Target-state building.
//!
//! Folds the decoded directory groups of one application into the desired
//! membership of each organization unit. A user claimed for the same unit by
//! several groups ends up with the highest of the claimed permissions.

use std::collections::BTreeMap;
use tracing::debug;

use crate::error::SyncResult;
use crate::model::{DirectoryGroup, DirectorySnapshot, DirectoryUser, OrganizationRole};
use crate::permission::{resolve, PermissionOrder};

/// One desired membership inside a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredMember<P> {
    pub username: String,
    pub permission: P,
}

/// Desired state of one organization unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredUnit<P> {
    pub name: String,
    members: BTreeMap<String, DesiredMember<P>>,
}

impl<P: PermissionOrder> DesiredUnit<P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Add `username` with `permission`, keeping the higher permission if the
    /// user is already a member.
    pub fn upsert(&mut self, username: &str, permission: P) {
        self.members
            .entry(username.to_string())
            .and_modify(|m| m.permission = resolve(m.permission, permission))
            .or_insert_with(|| DesiredMember {
                username: username.to_string(),
                permission,
            });
    }

    #[must_use]
    pub fn member(&self, username: &str) -> Option<&DesiredMember<P>> {
        self.members.get(username)
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    pub fn members(&self) -> impl Iterator<Item = &DesiredMember<P>> {
        self.members.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Desired downstream account for a directory user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredUser {
    /// Directory id, used to write the downstream id back.
    pub directory_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: Option<String>,
    /// Value of the configured SSO uid attribute, if any.
    pub external_uid: Option<String>,
}

impl DesiredUser {
    fn from_directory(user: &DirectoryUser, uid_attribute: Option<&str>) -> Self {
        Self {
            directory_id: user.id.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone().unwrap_or_default(),
            last_name: user.last_name.clone().unwrap_or_default(),
            name: user.name(),
            email: user.email.clone().filter(|e| !e.trim().is_empty()),
            external_uid: uid_attribute
                .and_then(|attr| user.attribute(attr))
                .map(str::to_string),
        }
    }
}

/// Desired state of one application: units by name, users by username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetState<P> {
    pub units: BTreeMap<String, DesiredUnit<P>>,
    pub users: BTreeMap<String, DesiredUser>,
}

impl<P> Default for TargetState<P> {
    fn default() -> Self {
        Self {
            units: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }
}

/// Builds a [`TargetState`] from a directory snapshot.
#[derive(Debug, Clone, Default)]
pub struct TargetStateBuilder<'a> {
    uid_attribute: Option<&'a str>,
    global_team: Option<&'a str>,
}

impl<'a> TargetStateBuilder<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory attribute holding the SSO provider's uid.
    #[must_use]
    pub fn uid_attribute(mut self, attribute: Option<&'a str>) -> Self {
        self.uid_attribute = attribute.filter(|a| !a.is_empty());
        self
    }

    /// Name of a unit every seen user joins at the base permission.
    #[must_use]
    pub fn global_team(mut self, team: Option<&'a str>) -> Self {
        self.global_team = team.filter(|t| !t.is_empty());
        self
    }

    /// Decode every group with `decode` and fold its members into the target
    /// state. Decode errors propagate and abort the build.
    pub fn build<P, F>(&self, snapshot: &DirectorySnapshot, decode: F) -> SyncResult<TargetState<P>>
    where
        P: PermissionOrder,
        F: Fn(&DirectoryGroup) -> SyncResult<Option<OrganizationRole<P>>>,
    {
        let mut state = TargetState::default();

        for group in snapshot.groups() {
            debug!(group = %group.path, "Converting directory group");
            let Some(role) = decode(group)? else {
                continue;
            };

            let unit = state
                .units
                .entry(role.unit.clone())
                .or_insert_with(|| DesiredUnit::new(role.unit.clone()));

            for user in snapshot.members_of(group) {
                unit.upsert(&user.username, role.permission);
                state
                    .users
                    .entry(user.username.clone())
                    .or_insert_with(|| DesiredUser::from_directory(user, self.uid_attribute));
            }
        }

        if let Some(team) = self.global_team {
            let unit = state
                .units
                .entry(team.to_string())
                .or_insert_with(|| DesiredUnit::new(team));
            for username in state.users.keys() {
                unit.upsert(username, P::base());
            }
            debug!(team, members = unit.len(), "Added global team");
        }

        Ok(state)
    }
}
