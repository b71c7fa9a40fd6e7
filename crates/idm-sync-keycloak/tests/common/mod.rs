//! Common test utilities for idm-sync-keycloak integration tests.

#![allow(dead_code)]

use idm_sync_keycloak::{KeycloakConfig, KeycloakDirectory};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "corp";
pub const TOKEN: &str = "kc-access-token";

/// Basic auth of `idm-sync:s3cr3t`.
pub const BASIC_AUTH: &str = "Basic aWRtLXN5bmM6czNjcjN0";

pub fn directory(server: &MockServer, per_page: u32) -> KeycloakDirectory {
    let mut config = KeycloakConfig::new(server.uri(), REALM, "idm-sync", "s3cr3t");
    config.client.per_page = per_page;
    config.client.retry_wait_seconds = 0;
    KeycloakDirectory::new(&config).unwrap()
}

pub fn admin_path(suffix: &str) -> String {
    format!("/admin/realms/{REALM}{suffix}")
}

/// Mount a token endpoint that accepts the test client credentials.
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/realms/{REALM}/protocol/openid-connect/token")))
        .and(header("authorization", BASIC_AUTH))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

pub fn group(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "path": format!("/{name}"), "subGroups": [] })
}

pub fn user(id: &str, username: &str) -> Value {
    json!({
        "id": id,
        "username": username,
        "firstName": "Test",
        "lastName": username,
        "email": format!("{username}@acme.example"),
        "enabled": true,
        "attributes": { "LDAP_ID": [format!("uid={username}")] }
    })
}
