//! Directory-side data model for one reconciliation pass.
//!
//! Groups and users are fetched fresh at the start of a pass and held in a
//! [`DirectorySnapshot`]. Groups reference their members by directory id, so
//! a user that belongs to several groups is one shared [`DirectoryUser`]
//! whose attribute map every connector of the pass mutates in turn.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute changes sent to the directory. `None` removes the attribute.
pub type AttributeUpdate = BTreeMap<String, Option<Vec<String>>>;

/// A user record from the central identity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    modified_attributes: BTreeSet<String>,
}

impl DirectoryUser {
    /// Create a user with the given directory id and username.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self.last_name = Some(last_name.to_string());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes
            .insert(name.to_string(), vec![value.to_string()]);
        self
    }

    /// Full display name, "first last", skipping absent parts.
    #[must_use]
    pub fn name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// First value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Store `value` as the single value of `name`.
    ///
    /// Returns `true` and marks the user dirty if the stored value changed.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        if self.attribute(name) == Some(value) {
            return false;
        }
        self.attributes
            .insert(name.to_string(), vec![value.to_string()]);
        self.modified_attributes.insert(name.to_string());
        true
    }

    /// Whether any attribute was changed during this pass.
    #[must_use]
    pub fn is_attributes_modified(&self) -> bool {
        !self.modified_attributes.is_empty()
    }

    /// The changed attributes, ready to be written back to the directory.
    #[must_use]
    pub fn pending_attribute_update(&self) -> AttributeUpdate {
        self.modified_attributes
            .iter()
            .map(|name| (name.clone(), self.attributes.get(name).cloned()))
            .collect()
    }

    /// Merge `update` into the attribute map.
    pub fn apply_attribute_update(&mut self, update: &AttributeUpdate) {
        for (name, values) in update {
            match values {
                Some(values) => {
                    self.attributes.insert(name.clone(), values.clone());
                }
                None => {
                    self.attributes.remove(name);
                }
            }
        }
    }

    pub fn clear_modified(&mut self) {
        self.modified_attributes.clear();
    }

    /// Whether a usable email address is present.
    #[must_use]
    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// A group record from the central identity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(skip)]
    member_ids: Vec<String>,
}

impl DirectoryGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            path: format!("/{name}"),
            name,
            member_ids: Vec::new(),
        }
    }

    /// Directory ids of the members, in insertion order.
    #[must_use]
    pub fn member_ids(&self) -> &[String] {
        &self.member_ids
    }
}

/// The directory state of one pass: groups plus their deduplicated members.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    groups: Vec<DirectoryGroup>,
    users: BTreeMap<String, DirectoryUser>,
}

impl DirectorySnapshot {
    #[must_use]
    pub fn new(groups: Vec<DirectoryGroup>) -> Self {
        Self {
            groups,
            users: BTreeMap::new(),
        }
    }

    /// Attach `members` to the group with id `group_id`.
    ///
    /// A user already known from another group keeps its existing record, so
    /// attribute changes made earlier in the pass are not lost.
    pub fn add_members(&mut self, group_id: &str, members: Vec<DirectoryUser>) {
        let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) else {
            return;
        };
        for member in members {
            if !group.member_ids.contains(&member.id) {
                group.member_ids.push(member.id.clone());
            }
            self.users.entry(member.id.clone()).or_insert(member);
        }
    }

    /// Builder-style variant of [`add_members`](Self::add_members).
    #[must_use]
    pub fn with_members(mut self, group_id: &str, members: Vec<DirectoryUser>) -> Self {
        self.add_members(group_id, members);
        self
    }

    #[must_use]
    pub fn groups(&self) -> &[DirectoryGroup] {
        &self.groups
    }

    /// Members of `group` in insertion order.
    pub fn members_of<'a>(
        &'a self,
        group: &'a DirectoryGroup,
    ) -> impl Iterator<Item = &'a DirectoryUser> + 'a {
        group.member_ids.iter().filter_map(|id| self.users.get(id))
    }

    /// Groups the user with directory id `user_id` belongs to.
    #[must_use]
    pub fn groups_of(&self, user_id: &str) -> Vec<&DirectoryGroup> {
        self.groups
            .iter()
            .filter(|g| g.member_ids.iter().any(|id| id == user_id))
            .collect()
    }

    #[must_use]
    pub fn user(&self, id: &str) -> Option<&DirectoryUser> {
        self.users.get(id)
    }

    pub fn user_mut(&mut self, id: &str) -> Option<&mut DirectoryUser> {
        self.users.get_mut(id)
    }

    #[must_use]
    pub fn user_by_username(&self, username: &str) -> Option<&DirectoryUser> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn users(&self) -> impl Iterator<Item = &DirectoryUser> {
        self.users.values()
    }

    pub fn users_mut(&mut self) -> impl Iterator<Item = &mut DirectoryUser> {
        self.users.values_mut()
    }

    /// Replace absent email addresses with `username@domain`.
    pub fn fill_missing_email(&mut self, domain: &str) {
        for user in self.users.values_mut() {
            if !user.has_email() {
                user.email = Some(format!("{}@{}", user.username, domain));
            }
        }
    }
}

/// Decoded meaning of one directory group for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRole<P> {
    pub unit: String,
    pub permission: P,
}

impl<P> OrganizationRole<P> {
    pub fn new(unit: impl Into<String>, permission: P) -> Self {
        Self {
            unit: unit.into(),
            permission,
        }
    }
}
