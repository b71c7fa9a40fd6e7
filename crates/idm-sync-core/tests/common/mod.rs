//! Common test utilities for idm-sync-core integration tests.

#![allow(dead_code)]

use idm_sync_core::{ClientConfig, RestClient};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::{Request, Respond, ResponseTemplate};

/// Client against `server_uri` with no API path and no retry wait.
pub fn client(server_uri: &str, per_page: u32) -> RestClient {
    let config = ClientConfig::new(server_uri)
        .with_per_page(per_page)
        .with_retry_wait_seconds(0);
    RestClient::new("test", &config, "/api").unwrap()
}

/// `count` items named `prefix-<n>` starting at `start`.
pub fn items(prefix: &str, start: usize, count: usize) -> Value {
    Value::Array(
        (start..start + count)
            .map(|i| json!({ "id": i, "name": format!("{prefix}-{i}") }))
            .collect(),
    )
}

/// Answers the first `failures` requests with 429, then with `body`.
pub struct RateLimitedThen {
    pub failures: usize,
    pub body: Value,
    pub calls: Arc<AtomicUsize>,
}

impl RateLimitedThen {
    pub fn new(failures: usize, body: Value) -> Self {
        Self {
            failures,
            body,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Respond for RateLimitedThen {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            ResponseTemplate::new(429).set_body_string("Too Many Requests")
        } else {
            ResponseTemplate::new(200).set_body_json(self.body.clone())
        }
    }
}
