//! Common test utilities for idm-sync-gitlab integration tests.

#![allow(dead_code)]

use idm_sync_core::{DecodePolicy, DirectoryGroup, DirectorySnapshot, DirectoryUser, SsoProvider};
use idm_sync_gitlab::{GitLabConfig, GitLabConnector};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "glpat-test";

pub fn config(server: &MockServer) -> GitLabConfig {
    let mut config = GitLabConfig::new(server.uri(), TOKEN);
    config.client.retry_wait_seconds = 0;
    config.excluded_users = "root".into();
    config
}

pub async fn connector(config: &GitLabConfig) -> GitLabConnector {
    GitLabConnector::new(config, DecodePolicy::SkipAndWarn).await.unwrap()
}

pub fn with_provider(mut config: GitLabConfig) -> GitLabConfig {
    config.provider = Some(SsoProvider {
        name: "ldapmain".into(),
        uid_attribute: "LDAP_ENTRY_DN".into(),
    });
    config
}

pub fn api(suffix: &str) -> String {
    format!("/api/v4{suffix}")
}

pub fn directory_user(id: &str, username: &str) -> DirectoryUser {
    DirectoryUser::new(id, username)
        .with_name("Test", username)
        .with_email(&format!("{username}@acme.example"))
        .with_attribute("LDAP_ENTRY_DN", &format!("uid={username},ou=people"))
}

/// One directory group per `(name, members)` pair.
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

pub fn gl_user(id: u64, username: &str, state: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "name": format!("Test {username}"),
        "email": format!("{username}@acme.example"),
        "state": state,
        "is_admin": false,
        "identities": []
    })
}

pub fn gl_member(id: u64, username: &str, access_level: u32) -> Value {
    json!({
        "id": id,
        "username": username,
        "name": format!("Test {username}"),
        "state": "active",
        "access_level": access_level
    })
}

pub fn gl_group(id: u64, path: &str) -> Value {
    json!({ "id": id, "path": path, "name": path, "parent_id": null })
}

pub async fn mount_get(server: &MockServer, suffix: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(api(suffix)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a write endpoint answering `status` with an empty object.
pub async fn mount_write(server: &MockServer, verb: &str, suffix: &str, status: u16) {
    Mock::given(method(verb))
        .and(path(api(suffix)))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({})))
        .mount(server)
        .await;
}
