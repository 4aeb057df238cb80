//! HTTP sessions used by virtual users.
//!
//! The engine only needs two things from the transport: "GET this URL and tell
//! me the status and body size", and "give every virtual user its own session".
//! Both are traits so the reqwest implementation can be swapped for a stub.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RunConfig;
use crate::errors::{error_chain_text, ErrorCategory};
use crate::utils::parse_headers_with_escapes;

/// User-Agent strings a session picks from, one per session.
pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const MAX_REDIRECTS: usize = 10;

/// What the engine keeps from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_length: u64,
}

/// A failure before (or while) a response was obtained.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct SessionError {
    pub category: ErrorCategory,
    pub message: String,
}

impl SessionError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(error: reqwest::Error) -> Self {
        Self {
            category: ErrorCategory::from_reqwest_error(&error),
            message: error_chain_text(&error),
        }
    }
}

/// One virtual user's connection state (cookies, keep-alive connections).
#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, SessionError>;
}

/// Builds a fresh session for each virtual user.
pub trait SessionFactory: Send + Sync {
    fn create_session(&self, user_id: usize) -> Result<Box<dyn Session>, SessionError>;
}

/// Session backed by its own `reqwest::Client`.
pub struct ReqwestSession {
    client: reqwest::Client,
}

impl ReqwestSession {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Session for ReqwestSession {
    async fn get(&self, url: &str) -> Result<HttpResponse, SessionError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status().as_u16();

        // Stream the body and keep only its size.
        let mut content_length = 0u64;
        while let Some(chunk) = response.chunk().await? {
            content_length += chunk.len() as u64;
        }

        Ok(HttpResponse {
            status,
            content_length,
        })
    }
}

/// Creates reqwest sessions that look like distinct browsers.
#[derive(Debug, Clone)]
pub struct ReqwestSessionFactory {
    timeout: Duration,
    skip_tls_verify: bool,
    custom_headers: HeaderMap,
}

impl ReqwestSessionFactory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            skip_tls_verify: false,
            custom_headers: HeaderMap::new(),
        }
    }

    /// Builds a factory from the run configuration, validating custom headers.
    pub fn from_config(config: &RunConfig) -> Result<Self, SessionError> {
        let custom_headers = match config.custom_headers.as_deref() {
            Some(raw) => parse_custom_headers(raw)?,
            None => HeaderMap::new(),
        };
        Ok(Self {
            timeout: config.request_timeout,
            skip_tls_verify: config.skip_tls_verify,
            custom_headers,
        })
    }

    fn session_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(
            HeaderName::from_static("upgrade-insecure-requests"),
            HeaderValue::from_static("1"),
        );
        for (name, value) in self.custom_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }
}

impl SessionFactory for ReqwestSessionFactory {
    fn create_session(&self, user_id: usize) -> Result<Box<dyn Session>, SessionError> {
        let headers = self.session_headers();
        debug!(
            user_id = user_id,
            user_agent = ?headers.get(USER_AGENT),
            "Creating HTTP session"
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60));

        if self.skip_tls_verify {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        let client = builder.build().map_err(|e| {
            SessionError::new(
                ErrorCategory::OtherError,
                format!("Failed to build HTTP client: {}", error_chain_text(&e)),
            )
        })?;
        Ok(Box::new(ReqwestSession::new(client)))
    }
}

/// Parses `Name:Value` pairs separated by commas (`\,` keeps a literal comma).
pub fn parse_custom_headers(raw: &str) -> Result<HeaderMap, SessionError> {
    let mut parsed = HeaderMap::new();

    for pair in parse_headers_with_escapes(raw) {
        let pair = pair.trim();
        let (name, value) = pair.split_once(':').ok_or_else(|| {
            SessionError::new(
                ErrorCategory::OtherError,
                format!(
                    "Invalid header format in CUSTOM_HEADERS: '{}'. Expected 'Name:Value'.",
                    pair
                ),
            )
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::new(
                ErrorCategory::OtherError,
                format!("Header name cannot be empty in '{}'", pair),
            ));
        }

        let header_name = HeaderName::from_str(name).map_err(|e| {
            SessionError::new(
                ErrorCategory::OtherError,
                format!("Invalid header name '{}': {}", name, e),
            )
        })?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|e| {
            SessionError::new(
                ErrorCategory::OtherError,
                format!("Invalid header value for '{}': {}", name, e),
            )
        })?;
        parsed.insert(header_name, header_value);
    }

    Ok(parsed)
}
