//! REST client tests against a mock server: paging strategies, rate-limit
//! retry and throttling.

mod common;

use common::*;
use idm_sync_core::{AuthScheme, OffsetStyle};
use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Item {
    id: u32,
    name: String,
}

#[tokio::test]
async fn test_linked_listing_follows_next_links() {
    let server = MockServer::start().await;
    let page2 = format!("{}/api/users?page=2&per_page=2", server.uri());

    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items("u", 2, 1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("per_page", "2"))
        .and(query_param("active", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(items("u", 0, 2))
                .insert_header("Link", format!("<{page2}>; rel=\"next\"").as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let users: Vec<Item> = client
        .get_list_linked("/users", &[("active", "true".to_string())])
        .await
        .unwrap();

    assert_eq!(users.len(), 3);
    assert_eq!(users[2].name, "u-2");
}

#[tokio::test]
async fn test_offset_listing_stops_on_short_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/groups"))
        .and(query_param("first", "0"))
        .and(query_param("max", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items("g", 0, 2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/groups"))
        .and(query_param("first", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items("g", 2, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let groups: Vec<Item> = client
        .get_list_offset("/groups", &[], OffsetStyle::FIRST_MAX)
        .await
        .unwrap();
    assert_eq!(groups.len(), 3);
}

#[tokio::test]
async fn test_page_listing_exact_multiple_needs_empty_page() {
    let server = MockServer::start().await;

    for (page, body) in [("0", items("t", 0, 2)), ("1", items("t", 2, 2)), ("2", json!([]))] {
        Mock::given(method("GET"))
            .and(path("/api/teams"))
            .and(query_param("page", page))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server.uri(), 2);
    let teams: Vec<Item> = client
        .get_list_offset("/teams", &[], OffsetStyle::PAGE)
        .await
        .unwrap();
    assert_eq!(teams.len(), 4);
}

#[tokio::test]
async fn test_failed_page_fails_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/teams"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let teams: Option<Vec<Item>> = client.get_list_offset("/teams", &[], OffsetStyle::PAGE).await;
    assert!(teams.is_none());
}

#[tokio::test]
async fn test_rate_limited_once_then_succeeds() {
    let server = MockServer::start().await;
    let responder = RateLimitedThen::new(1, json!({"id": 7, "name": "x"}));
    let calls = responder.calls.clone();
    Mock::given(method("POST"))
        .and(path("/api/groups"))
        .respond_with(responder)
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 100);
    let created: Option<Item> = client
        .post_query("/groups", &[("path", "acme".to_string())])
        .await;
    assert_eq!(created.map(|i| i.id), Some(7));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limited_twice_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/groups/1/members/2"))
        .respond_with(RateLimitedThen::new(2, json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 100);
    assert!(!client.delete("/groups/1/members/2", &[]).await);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 100);
    let user: Option<Item> = client.get_one("/users/1", &[]).await;
    assert!(user.is_none());
}

#[tokio::test]
async fn test_auth_headers_and_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/users/9/active"))
        .and(header("authorization", "Bearer mm-token"))
        .and(body_json(json!({"active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/9"))
        .and(header("private-token", "gl-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9, "name": "n"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 100);
    client
        .authorize(AuthScheme::Bearer(SecretString::from("mm-token")))
        .await;
    assert!(
        client
            .send(Method::PUT, "/users/9/active", &[], Some(&json!({"active": false})))
            .await
    );

    client
        .authorize(AuthScheme::PrivateToken(SecretString::from("gl-token")))
        .await;
    let user: Option<Item> = client.get_one("/users/9", &[]).await;
    assert_eq!(user.map(|u| u.id), Some(9));
}

#[tokio::test]
async fn test_low_remaining_quota_throttles_without_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(items("u", 0, 1))
                .insert_header("RateLimit-Remaining", "1")
                .insert_header("RateLimit-Reset", "0"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 10);
    let users: Vec<Item> = client.get_list_linked("/users", &[]).await.unwrap();
    assert_eq!(users.len(), 1);
}
