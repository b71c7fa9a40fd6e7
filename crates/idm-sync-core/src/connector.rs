//! Application connector and identity directory traits.
//!
//! The reconciliation driver owns one [`IdentityDirectory`] and a list of
//! [`ApplicationConnector`]s and runs them sequentially, handing each the
//! same [`DirectorySnapshot`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::audit::EventSink;
use crate::error::SyncResult;
use crate::model::{AttributeUpdate, DirectoryGroup, DirectorySnapshot, DirectoryUser};

/// Application-neutral form of a decoded group, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct GroupRole {
    pub unit: String,
    pub role: String,
}

impl GroupRole {
    pub fn new(unit: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            role: role.into(),
        }
    }
}

/// Usage statistics of one organization unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatistics {
    pub organization_name: String,
    pub statistics: BTreeMap<String, String>,
}

impl AppStatistics {
    pub fn new(organization_name: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            statistics: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.statistics.insert(key.to_string(), value.to_string());
        self
    }
}

/// One downstream application kept in sync with the directory.
#[async_trait]
pub trait ApplicationConnector: Send + Sync {
    /// Stable id, used in configuration and audit events.
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &str;

    /// What the application calls an organization unit ("group", "team").
    fn organization_type(&self) -> &'static str;

    /// Directory search used to pre-filter groups for this application.
    fn group_search_filter(&self) -> Option<&str>;

    /// Decode a directory group. Groups that do not decode, or decode to an
    /// unknown permission, yield `None`.
    fn decode_group(&self, group: &DirectoryGroup) -> Option<GroupRole>;

    /// Reconcile the application with the directory groups of `snapshot`.
    ///
    /// Writes the downstream user id back into the snapshot's users and
    /// publishes one event per state change. `Ok(false)` means the pass did
    /// not complete cleanly; `Err` is reserved for configuration problems
    /// such as an unknown permission.
    async fn sync(&self, snapshot: &mut DirectorySnapshot, sink: &dyn EventSink) -> SyncResult<bool>;

    /// Usage statistics per organization unit, `None` if unavailable.
    async fn statistics(&self) -> Option<Vec<AppStatistics>>;
}

/// The central identity directory.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Log in; later calls fail with `NotAuthenticated` until this succeeds.
    async fn authenticate(&self) -> bool;

    async fn get_groups(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryGroup>>;

    async fn get_users(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryUser>>;

    async fn get_group_members(&self, group: &DirectoryGroup) -> SyncResult<Vec<DirectoryUser>>;

    /// Persist `update` and merge it into `user` on success.
    async fn update_user_attributes(&self, user: &mut DirectoryUser, update: &AttributeUpdate) -> bool;

    /// Clear pending required actions of `user`.
    async fn remove_required_actions(&self, user: &DirectoryUser) -> bool;
}
