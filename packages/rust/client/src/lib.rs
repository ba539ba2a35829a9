//! HTTP client for the Bitrise build API.
//!
//! Two endpoints are used: the paginated build log
//! (`/apps/{app}/builds/{build}/log`) and the app's workflow definition
//! (`/apps/{app}/bitrise.yml`, served as plain YAML).

use std::time::Duration;

use buildtail_shared::{ApiConfig, BuildTailError, LogResponse, Result};
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

/// Default timeout in seconds for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("buildtail/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Client options
// ---------------------------------------------------------------------------

/// Configuration for [`BitriseClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API base URL, e.g. `https://api.bitrise.io/v0.1`.
    pub base_url: String,
    /// Personal access token sent as `Authorization: token <token>`.
    pub token: String,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl ClientOptions {
    /// Options from the `[api]` config section and a resolved token.
    pub fn from_api_config(api: &ApiConfig, token: impl Into<String>) -> Self {
        Self {
            base_url: api.base_url.clone(),
            token: token.into(),
            timeout_secs: api.timeout_secs,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_api_config(&ApiConfig::default(), String::new())
    }
}

// ---------------------------------------------------------------------------
// BitriseClient
// ---------------------------------------------------------------------------

/// Authenticated client for the build API.
#[derive(Debug, Clone)]
pub struct BitriseClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl BitriseClient {
    /// Build a client; fails on an unparsable base URL.
    pub fn new(opts: &ClientOptions) -> Result<Self> {
        let base_url = parse_base_url(&opts.base_url)?;
        let timeout = if opts.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            opts.timeout_secs
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| BuildTailError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: opts.token.clone(),
        })
    }

    /// URL of the build log, resuming after `position` when it is positive.
    pub fn log_url(&self, app_slug: &str, build_slug: &str, position: u64) -> Result<Url> {
        let mut url = self.endpoint(&["apps", app_slug, "builds", build_slug, "log"])?;
        if position > 0 {
            url.query_pairs_mut()
                .append_pair("from", &position.to_string());
        }
        Ok(url)
    }

    /// URL of the app's `bitrise.yml`.
    pub fn workflow_url(&self, app_slug: &str) -> Result<Url> {
        self.endpoint(&["apps", app_slug, "bitrise.yml"])
    }

    /// Fetch the log chunks of a build starting at `position`.
    #[instrument(skip(self))]
    pub async fn fetch_log_chunk(
        &self,
        app_slug: &str,
        build_slug: &str,
        position: u64,
    ) -> Result<LogResponse> {
        let url = self.log_url(app_slug, build_slug, position)?;
        let response = self.get(&url).await?;

        let body = response
            .text()
            .await
            .map_err(|e| BuildTailError::Network(format!("{url}: failed to read body: {e}")))?;

        let parsed: LogResponse = serde_json::from_str(&body)
            .map_err(|e| BuildTailError::parse(format!("{url}: invalid log response: {e}")))?;

        debug!(
            chunks = parsed.log_chunks.len(),
            archived = parsed.is_archived,
            "log response received"
        );
        Ok(parsed)
    }

    /// Fetch the app's workflow definition as raw YAML text.
    #[instrument(skip(self))]
    pub async fn fetch_workflow_yaml(&self, app_slug: &str) -> Result<String> {
        let url = self.workflow_url(app_slug)?;
        let response = self.get(&url).await?;

        response
            .text()
            .await
            .map_err(|e| BuildTailError::Network(format!("{url}: failed to read body: {e}")))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(empty) = segments.iter().position(|s| s.is_empty()) {
            return Err(BuildTailError::validation(format!(
                "empty path segment at index {empty} for {}",
                self.base_url
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BuildTailError::validation(format!("base URL cannot have a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: &Url) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .send()
            .await
            .map_err(|e| BuildTailError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuildTailError::Api {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

/// Parse the configured base URL, rejecting non-HTTP schemes.
fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| BuildTailError::validation(format!("invalid API base URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BuildTailError::validation(format!(
            "unsupported API base URL scheme '{other}'"
        ))),
    }
}
