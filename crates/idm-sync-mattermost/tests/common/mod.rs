//! Common test utilities for idm-sync-mattermost integration tests.

#![allow(dead_code)]

use idm_sync_core::{DecodePolicy, DirectoryGroup, DirectorySnapshot, DirectoryUser};
use idm_sync_mattermost::{MattermostConfig, MattermostConnector};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "mm-test-token";

pub fn config(server: &MockServer) -> MattermostConfig {
    let mut config = MattermostConfig::new(server.uri(), TOKEN);
    config.client.retry_wait_seconds = 0;
    config.excluded_users = "surveybot".into();
    config
}

pub async fn connector(config: &MattermostConfig) -> MattermostConnector {
    MattermostConnector::new(config, DecodePolicy::SkipAndWarn).await.unwrap()
}

pub fn api(suffix: &str) -> String {
    format!("/api/v4{suffix}")
}

pub fn directory_user(id: &str, username: &str) -> DirectoryUser {
    DirectoryUser::new(id, username)
        .with_name("Test", username)
        .with_email(&format!("{username}@acme.example"))
}

pub fn snapshot(groups: &[(&str, Vec<DirectoryUser>)]) -> DirectorySnapshot {
    let mut snapshot = DirectorySnapshot::new(
        groups
            .iter()
            .enumerate()
            .map(|(i, (name, _))| DirectoryGroup::new(format!("g{i}"), *name))
            .collect(),
    );
    for (i, (_, members)) in groups.iter().enumerate() {
        snapshot.add_members(&format!("g{i}"), members.clone());
    }
    snapshot
}

/// Account with id `mm-<username>`.
pub fn mm_user(username: &str, active: bool) -> Value {
    json!({
        "id": format!("mm-{username}"),
        "username": username,
        "first_name": "Test",
        "last_name": username,
        "email": format!("{username}@acme.example"),
        "delete_at": if active { 0 } else { 1_700_000_000_000_i64 },
        "roles": "system_user"
    })
}

pub fn mm_team(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "display_name": name, "type": "I" })
}

pub fn mm_member(team_id: &str, username: &str, admin: bool) -> Value {
    json!({
        "team_id": team_id,
        "user_id": format!("mm-{username}"),
        "roles": if admin { "team_user team_admin" } else { "team_user" }
    })
}

pub async fn mount_get(server: &MockServer, suffix: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(api(suffix)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a write endpoint that must be called exactly `times` times.
pub async fn expect_write(server: &MockServer, verb: &str, suffix: &str, times: u64) {
    Mock::given(method(verb))
        .and(path(api(suffix)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "OK" })))
        .expect(times)
        .mount(server)
        .await;
}
