//! One reconciliation pass over every enabled application.

use chrono::{DateTime, Utc};
use idm_sync_core::{
    ApplicationConnector, DirectorySnapshot, EventSink, IdentityDirectory, SyncResult,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncSettings;

/// How a call to [`SyncTask::run_pass`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every enabled application reconciled cleanly.
    Completed,
    /// At least one application failed or reported an incomplete sync.
    Incomplete,
    AuthenticationFailed,
    /// Another pass was still running.
    Skipped,
}

/// Fetch the groups `connector` is interested in and resolve every member.
///
/// `Ok(None)` when the directory search returns no group. A member listing
/// that fails fails the whole load, since reconciling against a partial
/// membership would remove users.
pub async fn load_snapshot(
    directory: &dyn IdentityDirectory,
    connector: &dyn ApplicationConnector,
) -> SyncResult<Option<DirectorySnapshot>> {
    let groups = directory.get_groups(connector.group_search_filter()).await?;
    if groups.is_empty() {
        return Ok(None);
    }
    let mut snapshot = DirectorySnapshot::new(groups.clone());
    for group in &groups {
        let members = directory.get_group_members(group).await?;
        debug!(group = %group.path, members = members.len(), "Resolved group members");
        snapshot.add_members(&group.id, members);
    }
    Ok(Some(snapshot))
}

/// Drives the directory and the connectors through reconciliation passes.
pub struct SyncTask {
    directory: Box<dyn IdentityDirectory>,
    connectors: Vec<Box<dyn ApplicationConnector>>,
    settings: SyncSettings,
    sink: Arc<dyn EventSink>,
    running: Mutex<()>,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
}

impl SyncTask {
    pub fn new(
        directory: Box<dyn IdentityDirectory>,
        connectors: Vec<Box<dyn ApplicationConnector>>,
        settings: SyncSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            directory,
            connectors,
            settings,
            sink,
            running: Mutex::new(()),
            last_sync_time: RwLock::new(None),
        }
    }

    /// End of the last pass that completed cleanly.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self
            .last_sync_time
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Display names of all configured applications.
    #[must_use]
    pub fn application_names(&self) -> Vec<String> {
        self.connectors
            .iter()
            .map(|c| c.display_name().to_string())
            .collect()
    }

    /// Run one pass unless another one is still in progress.
    pub async fn run_pass(&self) -> PassOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous pass still running, skipping this trigger");
            return PassOutcome::Skipped;
        };

        info!("Start syncing");
        if !self.directory.authenticate().await {
            error!("Directory authentication failed, abandoning pass");
            return PassOutcome::AuthenticationFailed;
        }

        let mut clean = true;
        for connector in &self.connectors {
            if !self.settings.is_enabled(connector.id()) {
                debug!(application = connector.id(), "Application not enabled");
                continue;
            }
            match self.sync_application(connector.as_ref()).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(application = connector.id(), "Application sync incomplete");
                    clean = false;
                }
                Err(e) => {
                    error!(application = connector.id(), error = %e, "Application sync failed");
                    clean = false;
                }
            }
        }

        if clean {
            let now = Utc::now();
            *self
                .last_sync_time
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(now);
            info!(last_sync = %now, "Finished syncing");
            PassOutcome::Completed
        } else {
            info!("Finished syncing with errors");
            PassOutcome::Incomplete
        }
    }

    #[instrument(skip(self, connector), fields(application = connector.id()))]
    async fn sync_application(&self, connector: &dyn ApplicationConnector) -> SyncResult<bool> {
        info!(name = connector.display_name(), "Syncing");
        let Some(mut snapshot) = load_snapshot(self.directory.as_ref(), connector).await? else {
            info!("No directory groups found");
            return Ok(true);
        };
        if let Some(domain) = &self.settings.email_domain {
            snapshot.fill_missing_email(domain);
        }

        let synced = connector.sync(&mut snapshot, self.sink.as_ref()).await?;
        let written = self.write_back(&mut snapshot).await;
        Ok(synced && written)
    }

    /// Persist attributes the connector changed on directory users.
    async fn write_back(&self, snapshot: &mut DirectorySnapshot) -> bool {
        let mut clean = true;
        for user in snapshot.users_mut() {
            if !user.is_attributes_modified() {
                continue;
            }
            let update = user.pending_attribute_update();
            if !self.directory.update_user_attributes(user, &update).await {
                warn!(username = %user.username, "Writing back attributes failed");
                clean = false;
                continue;
            }
            user.clear_modified();
            if self.settings.remove_required_actions
                && !self.directory.remove_required_actions(user).await
            {
                warn!(username = %user.username, "Removing required actions failed");
                clean = false;
            }
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use idm_sync_core::{
        AppStatistics, AttributeUpdate, AuditEvent, DirectoryGroup, DirectoryUser, EventType,
        GroupRole, RecordingSink, SyncError,
    };
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    use crate::logging::init_test_logging;

    const ID_ATTRIBUTE: &str = "FAKE_USER_ID";

    #[derive(Default)]
    struct FakeDirectory {
        deny_login: bool,
        groups: Vec<DirectoryGroup>,
        members: StdMutex<BTreeMap<String, Vec<DirectoryUser>>>,
        failing_group: Option<String>,
        updates: StdMutex<Vec<String>>,
        cleared_actions: StdMutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn with_group(mut self, id: &str, name: &str, members: Vec<DirectoryUser>) -> Self {
            self.groups.push(DirectoryGroup::new(id, name));
            self.members
                .get_mut()
                .unwrap()
                .insert(id.to_string(), members);
            self
        }

        fn updates(&self) -> Vec<String> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdentityDirectory for FakeDirectory {
        async fn authenticate(&self) -> bool {
            !self.deny_login
        }

        async fn get_groups(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryGroup>> {
            Ok(self
                .groups
                .iter()
                .filter(|g| search.map_or(true, |s| g.name.starts_with(s)))
                .cloned()
                .collect())
        }

        async fn get_users(&self, _search: Option<&str>) -> SyncResult<Vec<DirectoryUser>> {
            Ok(Vec::new())
        }

        async fn get_group_members(&self, group: &DirectoryGroup) -> SyncResult<Vec<DirectoryUser>> {
            if self.failing_group.as_deref() == Some(group.id.as_str()) {
                return Err(SyncError::Unavailable("members".into()));
            }
            Ok(self
                .members
                .lock()
                .unwrap()
                .get(&group.id)
                .cloned()
                .unwrap_or_default())
        }

        async fn update_user_attributes(&self, user: &mut DirectoryUser, update: &AttributeUpdate) -> bool {
            user.apply_attribute_update(update);
            for members in self.members.lock().unwrap().values_mut() {
                for member in members.iter_mut().filter(|m| m.id == user.id) {
                    member.apply_attribute_update(update);
                }
            }
            self.updates.lock().unwrap().push(user.username.clone());
            true
        }

        async fn remove_required_actions(&self, user: &DirectoryUser) -> bool {
            self.cleared_actions
                .lock()
                .unwrap()
                .push(user.username.clone());
            true
        }
    }

    /// Stores `fake-<username>` as the id of every user it sees.
    struct FakeConnector {
        id: &'static str,
        search: Option<String>,
        result: Result<bool, ()>,
        calls: StdMutex<usize>,
        emails: StdMutex<Vec<String>>,
        entered: Arc<Notify>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeConnector {
        fn new(id: &'static str, search: &str) -> Self {
            Self {
                id,
                search: Some(search.to_string()),
                result: Ok(true),
                calls: StdMutex::new(0),
                emails: StdMutex::new(Vec::new()),
                entered: Arc::new(Notify::new()),
                gate: None,
            }
        }

        fn returning(mut self, result: Result<bool, ()>) -> Self {
            self.result = result;
            self
        }
    }

    #[async_trait]
    impl ApplicationConnector for FakeConnector {
        fn id(&self) -> &'static str {
            self.id
        }

        fn display_name(&self) -> &str {
            self.id
        }

        fn organization_type(&self) -> &'static str {
            "group"
        }

        fn group_search_filter(&self) -> Option<&str> {
            self.search.as_deref()
        }

        fn decode_group(&self, group: &DirectoryGroup) -> Option<GroupRole> {
            Some(GroupRole::new(group.name.clone(), "MEMBER"))
        }

        async fn sync(&self, snapshot: &mut DirectorySnapshot, sink: &dyn EventSink) -> SyncResult<bool> {
            *self.calls.lock().unwrap() += 1;
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            for user in snapshot.users_mut() {
                self.emails
                    .lock()
                    .unwrap()
                    .push(user.email.clone().unwrap_or_default());
                let value = format!("fake-{}", user.username);
                if user.set_attribute(ID_ATTRIBUTE, &value) {
                    sink.publish(
                        AuditEvent::new(EventType::UserCreated, self.id).with("username", &user.username),
                    );
                }
            }
            self.result
                .map_err(|()| SyncError::Config("fake: unsupported permission".into()))
        }

        async fn statistics(&self) -> Option<Vec<AppStatistics>> {
            None
        }
    }

    fn user(id: &str, username: &str) -> DirectoryUser {
        DirectoryUser::new(id, username).with_email(&format!("{username}@acme.example"))
    }

    fn directory() -> FakeDirectory {
        FakeDirectory::default()
            .with_group("g1", "APP_GIT_acme_Developer", vec![user("u1", "alice"), user("u2", "bob")])
            .with_group("g2", "APP_GIT_beta_Owner", vec![user("u1", "alice")])
            .with_group("g3", "APP_MM_chat", vec![user("u3", "carol")])
    }

    fn task(
        directory: FakeDirectory,
        connectors: Vec<Box<dyn ApplicationConnector>>,
        settings: SyncSettings,
    ) -> (SyncTask, Arc<RecordingSink>) {
        init_test_logging();
        let sink = Arc::new(RecordingSink::new());
        let task = SyncTask::new(Box::new(directory), connectors, settings, sink.clone());
        (task, sink)
    }

    #[tokio::test]
    async fn test_authentication_failure_abandons_pass() {
        let directory = FakeDirectory {
            deny_login: true,
            ..directory()
        };
        let (task, sink) = task(
            directory,
            vec![Box::new(FakeConnector::new("gitlab", "APP_GIT"))],
            SyncSettings::default(),
        );
        assert_eq!(task.run_pass().await, PassOutcome::AuthenticationFailed);
        assert!(task.last_sync_time().is_none());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_clean_pass_writes_back_and_records_time() {
        let (task, sink) = task(
            directory(),
            vec![
                Box::new(FakeConnector::new("gitlab", "APP_GIT")),
                Box::new(FakeConnector::new("mattermost", "APP_MM")),
            ],
            SyncSettings::default(),
        );
        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert!(task.last_sync_time().is_some());
        assert_eq!(task.application_names(), vec!["gitlab", "mattermost"]);

        // alice is in two gitlab groups but one shared record
        assert_eq!(sink.count(EventType::UserCreated), 3);
    }

    #[tokio::test]
    async fn test_second_pass_over_unchanged_state_writes_nothing() {
        let directory = Arc::new(directory());
        let sink = Arc::new(RecordingSink::new());
        let task = SyncTask::new(
            Box::new(SharedDirectory(directory.clone())),
            vec![Box::new(FakeConnector::new("gitlab", "APP_GIT"))],
            SyncSettings::default(),
            sink.clone(),
        );

        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert_eq!(directory.updates(), vec!["alice", "bob"]);

        sink.clear();
        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert_eq!(directory.updates().len(), 2);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_sync_keeps_last_sync_time() {
        init_test_logging();
        let directory = Arc::new(directory());
        let task = SyncTask::new(
            Box::new(SharedDirectory(directory.clone())),
            vec![
                Box::new(FakeConnector::new("gitlab", "APP_GIT").returning(Ok(false))),
                Box::new(FakeConnector::new("mattermost", "APP_MM")),
            ],
            SyncSettings::default(),
            Arc::new(RecordingSink::new()),
        );
        assert_eq!(task.run_pass().await, PassOutcome::Incomplete);
        assert!(task.last_sync_time().is_none());
        // write-back still happens after an incomplete sync
        assert_eq!(directory.updates(), vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_application_error_does_not_stop_others() {
        let (task, sink) = task(
            directory(),
            vec![
                Box::new(FakeConnector::new("gitlab", "APP_GIT").returning(Err(()))),
                Box::new(FakeConnector::new("mattermost", "APP_MM")),
            ],
            SyncSettings::default(),
        );
        assert_eq!(task.run_pass().await, PassOutcome::Incomplete);
        assert_eq!(
            sink.events()
                .iter()
                .filter(|e| e.application() == "mattermost")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_disabled_application_is_not_synced() {
        let settings = SyncSettings {
            enabled_apps: vec!["mattermost".into()],
            ..SyncSettings::default()
        };
        let gitlab = Arc::new(FakeConnector::new("gitlab", "APP_GIT"));
        let (task, sink) = task(
            directory(),
            vec![
                Box::new(SharedConnector(gitlab.clone())),
                Box::new(FakeConnector::new("mattermost", "APP_MM")),
            ],
            settings,
        );
        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert_eq!(*gitlab.calls.lock().unwrap(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_group_search_skips_application() {
        let jira = Arc::new(FakeConnector::new("jira", "APP_JIRA"));
        let (task, _) = task(
            directory(),
            vec![Box::new(SharedConnector(jira.clone()))],
            SyncSettings::default(),
        );
        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert_eq!(*jira.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_member_listing_failure_skips_application() {
        let directory = FakeDirectory {
            failing_group: Some("g2".into()),
            ..directory()
        };
        let gitlab = Arc::new(FakeConnector::new("gitlab", "APP_GIT"));
        let (task, _) = task(
            directory,
            vec![Box::new(SharedConnector(gitlab.clone()))],
            SyncSettings::default(),
        );
        assert_eq!(task.run_pass().await, PassOutcome::Incomplete);
        assert_eq!(*gitlab.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_email_is_filled() {
        let directory = FakeDirectory::default().with_group(
            "g1",
            "APP_GIT_acme_Developer",
            vec![DirectoryUser::new("u1", "alice"), user("u2", "bob")],
        );
        let settings = SyncSettings {
            email_domain: Some("corp.example".into()),
            ..SyncSettings::default()
        };
        let gitlab = Arc::new(FakeConnector::new("gitlab", "APP_GIT"));
        let (task, _) = task(directory, vec![Box::new(SharedConnector(gitlab.clone()))], settings);
        task.run_pass().await;
        assert_eq!(
            *gitlab.emails.lock().unwrap(),
            vec!["alice@corp.example", "bob@acme.example"]
        );
    }

    #[tokio::test]
    async fn test_required_actions_removed_for_written_users() {
        let directory = Arc::new(directory());
        let settings = SyncSettings {
            remove_required_actions: true,
            ..SyncSettings::default()
        };
        let task = SyncTask::new(
            Box::new(SharedDirectory(directory.clone())),
            vec![Box::new(FakeConnector::new("mattermost", "APP_MM"))],
            settings,
            Arc::new(RecordingSink::new()),
        );
        task.run_pass().await;
        assert_eq!(*directory.cleared_actions.lock().unwrap(), vec!["carol"]);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let gate = Arc::new(Notify::new());
        let mut connector = FakeConnector::new("gitlab", "APP_GIT");
        connector.gate = Some(gate.clone());
        let entered = connector.entered.clone();

        let (task, _) = task(directory(), vec![Box::new(connector)], SyncSettings::default());
        let task = Arc::new(task);

        let first = tokio::spawn({
            let task = task.clone();
            async move { task.run_pass().await }
        });
        entered.notified().await;

        assert_eq!(task.run_pass().await, PassOutcome::Skipped);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), PassOutcome::Completed);
    }

    #[tokio::test]
    async fn test_pass_writes_gitlab_id_back_to_keycloak() {
        use idm_sync_gitlab::{GitLabConfig, GitLabConnector};
        use idm_sync_keycloak::{KeycloakConfig, KeycloakDirectory};
        use serde_json::json;
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        init_test_logging();
        let keycloak = MockServer::start().await;
        let gitlab = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/realms/corp/protocol/openid-connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "kc" })))
            .mount(&keycloak)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/corp/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "g1", "name": "APP_GIT_acme_Developer", "path": "/APP_GIT_acme_Developer" }
            ])))
            .mount(&keycloak)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/realms/corp/groups/g1/members"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "u1", "username": "alice", "firstName": "Alice", "lastName": "Smith" }
            ])))
            .mount(&keycloak)
            .await;
        Mock::given(method("PUT"))
            .and(path("/admin/realms/corp/users/u1"))
            .and(body_partial_json(json!({ "attributes": { "GITLAB_USER_ID": ["7"] } })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&keycloak)
            .await;
        Mock::given(method("PUT"))
            .and(path("/admin/realms/corp/users/u1"))
            .and(body_partial_json(json!({ "requiredActions": [] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&keycloak)
            .await;

        for (verb, suffix, body) in [
            ("GET", "/users", json!([])),
            ("GET", "/groups", json!([])),
            ("POST", "/users", json!({ "id": 7, "username": "alice", "name": "Alice Smith", "state": "active" })),
            ("POST", "/groups", json!({ "id": 1, "path": "acme", "name": "acme" })),
            ("POST", "/groups/1/members", json!({ "id": 7, "username": "alice", "access_level": 30 })),
        ] {
            Mock::given(method(verb))
                .and(path(format!("/api/v4{suffix}")))
                .respond_with(ResponseTemplate::new(if verb == "GET" { 200 } else { 201 }).set_body_json(body))
                .mount(&gitlab)
                .await;
        }

        let mut kc_config = KeycloakConfig::new(keycloak.uri(), "corp", "idm-sync", "s3cr3t");
        kc_config.client.retry_wait_seconds = 0;
        let mut gl_config = GitLabConfig::new(gitlab.uri(), "glpat");
        gl_config.client.retry_wait_seconds = 0;

        let settings = SyncSettings {
            email_domain: Some("acme.example".into()),
            remove_required_actions: true,
            ..SyncSettings::default()
        };
        let sink = Arc::new(RecordingSink::new());
        let task = SyncTask::new(
            Box::new(KeycloakDirectory::new(&kc_config).unwrap()),
            vec![Box::new(
                GitLabConnector::new(&gl_config, settings.decode_policy())
                    .await
                    .unwrap(),
            )],
            settings,
            sink.clone(),
        );

        assert_eq!(task.run_pass().await, PassOutcome::Completed);
        assert_eq!(
            sink.types(),
            vec![EventType::UserCreated, EventType::CompositeCreated, EventType::UserAdded]
        );
    }

    struct SharedDirectory(Arc<FakeDirectory>);

    #[async_trait]
    impl IdentityDirectory for SharedDirectory {
        async fn authenticate(&self) -> bool {
            self.0.authenticate().await
        }

        async fn get_groups(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryGroup>> {
            self.0.get_groups(search).await
        }

        async fn get_users(&self, search: Option<&str>) -> SyncResult<Vec<DirectoryUser>> {
            self.0.get_users(search).await
        }

        async fn get_group_members(&self, group: &DirectoryGroup) -> SyncResult<Vec<DirectoryUser>> {
            self.0.get_group_members(group).await
        }

        async fn update_user_attributes(&self, user: &mut DirectoryUser, update: &AttributeUpdate) -> bool {
            self.0.update_user_attributes(user, update).await
        }

        async fn remove_required_actions(&self, user: &DirectoryUser) -> bool {
            self.0.remove_required_actions(user).await
        }
    }

    struct SharedConnector(Arc<FakeConnector>);

    #[async_trait]
    impl ApplicationConnector for SharedConnector {
        fn id(&self) -> &'static str {
            self.0.id()
        }

        fn display_name(&self) -> &str {
            self.0.display_name()
        }

        fn organization_type(&self) -> &'static str {
            self.0.organization_type()
        }

        fn group_search_filter(&self) -> Option<&str> {
            self.0.group_search_filter()
        }

        fn decode_group(&self, group: &DirectoryGroup) -> Option<GroupRole> {
            self.0.decode_group(group)
        }

        async fn sync(&self, snapshot: &mut DirectorySnapshot, sink: &dyn EventSink) -> SyncResult<bool> {
            self.0.sync(snapshot, sink).await
        }

        async fn statistics(&self) -> Option<Vec<AppStatistics>> {
            self.0.statistics().await
        }
    }
}
