//! Paginated, rate-limited REST client shared by the directory and the
//! application connectors.
//!
//! Every public call goes through [`RateLimitRetry`], so callers only ever see
//! `Option<T>` / `bool`: `None` / `false` means "this one operation did not
//! complete" and never aborts a pass.

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::link_header::LinkHeader;
use crate::retry::RateLimitRetry;

const USER_AGENT: &str = concat!("idm-sync/", env!("CARGO_PKG_VERSION"));

/// Reset values above this are absolute Unix timestamps, not seconds.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Query parameters of one call.
pub type Query<'a> = &'a [(&'a str, String)];

/// How a client authenticates its requests.
#[derive(Clone, Default)]
pub enum AuthScheme {
    #[default]
    None,
    /// GitLab-style `PRIVATE-TOKEN` header.
    PrivateToken(SecretString),
    /// `Authorization: Bearer` header.
    Bearer(SecretString),
}

impl AuthScheme {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            AuthScheme::None => builder,
            AuthScheme::PrivateToken(token) => builder.header("PRIVATE-TOKEN", token.expose_secret()),
            AuthScheme::Bearer(token) => builder.bearer_auth(token.expose_secret()),
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, AuthScheme::None)
    }
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::None => f.write_str("None"),
            AuthScheme::PrivateToken(_) => f.write_str("PrivateToken([REDACTED])"),
            AuthScheme::Bearer(_) => f.write_str("Bearer([REDACTED])"),
        }
    }
}

/// Parameter names of an offset-paged listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetStyle {
    /// Zero-based page number plus page size (`page`, `per_page`).
    Page {
        page_param: &'static str,
        size_param: &'static str,
    },
    /// Zero-based item offset plus page size (`first`, `max`).
    Offset {
        first_param: &'static str,
        max_param: &'static str,
    },
}

impl OffsetStyle {
    /// `page` / `per_page`.
    pub const PAGE: OffsetStyle = OffsetStyle::Page {
        page_param: "page",
        size_param: "per_page",
    };

    /// `first` / `max`.
    pub const FIRST_MAX: OffsetStyle = OffsetStyle::Offset {
        first_param: "first",
        max_param: "max",
    };

    fn params(&self, round: u32, per_page: u32) -> [(&'static str, String); 2] {
        match *self {
            OffsetStyle::Page {
                page_param,
                size_param,
            } => [
                (page_param, round.to_string()),
                (size_param, per_page.to_string()),
            ],
            OffsetStyle::Offset {
                first_param,
                max_param,
            } => [
                (first_param, (u64::from(round) * u64::from(per_page)).to_string()),
                (max_param, per_page.to_string()),
            ],
        }
    }
}

/// REST client for one remote API.
#[derive(Debug)]
pub struct RestClient {
    application: String,
    base_url: String,
    http: Client,
    per_page: u32,
    retry: RateLimitRetry,
    auth: RwLock<AuthScheme>,
}

impl RestClient {
    /// Build a client for `{server_url}{api_path}`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the HTTP client or proxy cannot be built.
    pub fn new(application: &str, config: &ClientConfig, api_path: &str) -> SyncResult<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| SyncError::Config(format!("{application}: invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            application: application.to_string(),
            base_url: format!("{}{}", config.server_url.trim_end_matches('/'), api_path),
            http,
            per_page: config.per_page.max(1),
            retry: RateLimitRetry::new(config.retry_wait_seconds),
            auth: RwLock::new(AuthScheme::None),
        })
    }

    /// Replace the authentication used for all later calls.
    pub async fn authorize(&self, scheme: AuthScheme) {
        *self.auth.write().await = scheme;
    }

    /// Whether an authentication scheme has been installed.
    pub async fn is_authorized(&self) -> bool {
        !self.auth.read().await.is_none()
    }

    /// Underlying HTTP client, for calls outside the API root (logins).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    #[must_use]
    pub fn retry(&self) -> RateLimitRetry {
        self.retry
    }

    fn url(&self, path: &str, query: Query<'_>) -> SyncResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Send one request and map the status to an error.
    async fn call(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> SyncResult<Response> {
        debug!(application = %self.application, %method, url = %url, "API call");
        let mut request = self.http.request(method.clone(), url.clone());
        request = self.auth.read().await.apply(request);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            error!(application = %self.application, %method, url = %url, status = status.as_u16(), body = %body, "API call failed");
            return Err(SyncError::Api {
                status: status.as_u16(),
                body,
            });
        }

        self.throttle(response.headers()).await;
        Ok(response)
    }

    /// Sleep when the remote reports fewer remaining requests than one page.
    async fn throttle(&self, headers: &HeaderMap) {
        let Some(remaining) = header_u64(headers, &["x-ratelimit-remaining", "ratelimit-remaining"])
        else {
            return;
        };
        if remaining >= u64::from(self.per_page) {
            return;
        }
        let wait = header_u64(headers, &["x-ratelimit-reset", "ratelimit-reset"])
            .map(reset_to_wait)
            .unwrap_or_else(|| self.retry.wait());
        warn!(
            application = %self.application,
            remaining,
            wait_secs = wait.as_secs(),
            "Approaching API rate limit, throttling"
        );
        tokio::time::sleep(wait).await;
    }

    async fn json_call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> SyncResult<T> {
        let response = self.call(method, url, body).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    fn operation(method: &Method, url: &Url) -> String {
        format!("{method} {}", url.path())
    }

    /// GET a single resource.
    #[instrument(skip(self, query), fields(application = %self.application))]
    pub async fn get_one<T: DeserializeOwned>(&self, path: &str, query: Query<'_>) -> Option<T> {
        let url = self.url_or_log(path, query)?;
        let operation = Self::operation(&Method::GET, &url);
        self.retry
            .run(&operation, || self.json_call(Method::GET, &url, None))
            .await
    }

    /// GET a listing that is paged through `Link: <..>; rel="next"` headers.
    ///
    /// `per_page` is appended to the first request; later pages follow the
    /// URL the server returns. A page that cannot be fetched fails the whole
    /// listing.
    #[instrument(skip(self, query), fields(application = %self.application))]
    pub async fn get_list_linked<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
    ) -> Option<Vec<T>> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("per_page", self.per_page.to_string()));
        let mut next = Some(self.url_or_log(path, &params)?);
        let mut items = Vec::new();

        while let Some(url) = next.take() {
            let operation = Self::operation(&Method::GET, &url);
            let (page, link): (Vec<T>, Option<String>) = self
                .retry
                .run(&operation, || async {
                    let response = self.call(Method::GET, &url, None).await?;
                    let link = LinkHeader::from_headers(response.headers())
                        .and_then(|h| h.next().map(str::to_string));
                    let text = response.text().await?;
                    Ok((serde_json::from_str(&text)?, link))
                })
                .await?;

            debug!(count = page.len(), has_next = link.is_some(), "Fetched page");
            items.extend(page);
            next = match link {
                Some(link) => match Url::parse(&link) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        error!(link = %link, error = %e, "Invalid next page link");
                        return None;
                    }
                },
                None => None,
            };
        }
        Some(items)
    }

    /// GET a listing that is paged by page number or item offset.
    ///
    /// Stops at the first page shorter than the page size.
    #[instrument(skip(self, query), fields(application = %self.application))]
    pub async fn get_list_offset<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Query<'_>,
        style: OffsetStyle,
    ) -> Option<Vec<T>> {
        let mut items = Vec::new();
        let mut round: u32 = 0;
        loop {
            let mut params: Vec<(&str, String)> = query.to_vec();
            params.extend(style.params(round, self.per_page));
            let url = self.url_or_log(path, &params)?;
            let operation = Self::operation(&Method::GET, &url);
            let page: Vec<T> = self
                .retry
                .run(&operation, || self.json_call(Method::GET, &url, None))
                .await?;

            let len = page.len();
            debug!(round, count = len, "Fetched page");
            items.extend(page);
            if len < self.per_page as usize {
                return Some(items);
            }
            round += 1;
        }
    }

    /// POST a JSON body and decode the response.
    pub async fn post_json<B, T>(&self, path: &str, query: Query<'_>, body: &B) -> Option<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write(Method::POST, path, query, Some(body)).await
    }

    /// POST with parameters in the query string and decode the response.
    pub async fn post_query<T: DeserializeOwned>(&self, path: &str, query: Query<'_>) -> Option<T> {
        self.write::<(), T>(Method::POST, path, query, None).await
    }

    /// PUT a JSON body and decode the response.
    pub async fn put_json<B, T>(&self, path: &str, query: Query<'_>, body: &B) -> Option<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write(Method::PUT, path, query, Some(body)).await
    }

    /// PUT with parameters in the query string and decode the response.
    pub async fn put_query<T: DeserializeOwned>(&self, path: &str, query: Query<'_>) -> Option<T> {
        self.write::<(), T>(Method::PUT, path, query, None).await
    }

    /// DELETE a resource.
    pub async fn delete(&self, path: &str, query: Query<'_>) -> bool {
        self.send::<()>(Method::DELETE, path, query, None).await
    }

    /// Issue a call whose response body is irrelevant.
    #[instrument(skip(self, query, body), fields(application = %self.application))]
    pub async fn send<B>(&self, method: Method, path: &str, query: Query<'_>, body: Option<&B>) -> bool
    where
        B: Serialize + ?Sized,
    {
        let Some(url) = self.url_or_log(path, query) else {
            return false;
        };
        let Some(body) = to_json(body) else {
            return false;
        };
        let operation = Self::operation(&method, &url);
        self.retry
            .run(&operation, || async {
                self.call(method.clone(), &url, body.as_ref()).await.map(|_| ())
            })
            .await
            .is_some()
    }

    #[instrument(skip(self, query, body), fields(application = %self.application))]
    async fn write<B, T>(&self, method: Method, path: &str, query: Query<'_>, body: Option<&B>) -> Option<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url_or_log(path, query)?;
        let body = to_json(body)?;
        let operation = Self::operation(&method, &url);
        self.retry
            .run(&operation, || self.json_call(method.clone(), &url, body.as_ref()))
            .await
    }

    fn url_or_log(&self, path: &str, query: Query<'_>) -> Option<Url> {
        match self.url(path, query) {
            Ok(url) => Some(url),
            Err(e) => {
                error!(application = %self.application, path, error = %e, "Invalid API URL");
                None
            }
        }
    }
}

/// Serialize an optional body; the outer `None` means serialization failed.
fn to_json<B: Serialize + ?Sized>(body: Option<&B>) -> Option<Option<serde_json::Value>> {
    match body.map(serde_json::to_value).transpose() {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "Failed to serialize request body");
            None
        }
    }
}

fn header_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Turn a reset header value into a wait, accepting both "seconds from now"
/// and an absolute Unix timestamp.
fn reset_to_wait(value: u64) -> Duration {
    if value < EPOCH_THRESHOLD {
        return Duration::from_secs(value);
    }
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    Duration::from_secs(value.saturating_sub(now))
}
