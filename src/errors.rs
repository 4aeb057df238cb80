//! Error types and error categorization.
//!
//! Request failures are never propagated as errors: they become result records.
//! The categories here classify those failures for logging and for the status
//! breakdown of the final report. `ConfigError` is the one error that stops a
//! run, and it always does so before any load is generated.

use std::fmt;
use thiserror::Error;

/// Categories of failures observed while generating load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx responses
    ClientError,

    /// HTTP 5xx responses
    ServerError,

    /// DNS, connection refused, reset, body read failures
    NetworkError,

    /// Request exceeded the configured timeout
    TimeoutError,

    /// TLS/SSL handshake or certificate errors
    TlsError,

    /// Anything else
    OtherError,
}

impl ErrorCategory {
    /// Categorize a non-success HTTP status code.
    ///
    /// Returns `None` for 2xx and 3xx responses. Status 0 (no response at all)
    /// is `OtherError`; the transport error itself carries the real category.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=399 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a reqwest transport error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() || error.is_request() || error.is_body() || error.is_decode()
        {
            // Connection setup failures can still be TLS handshakes underneath.
            Self::from_message(&error_chain_text(error)).unwrap_or(ErrorCategory::NetworkError)
        } else if error.is_redirect() {
            ErrorCategory::ClientError
        } else {
            Self::from_message(&error_chain_text(error)).unwrap_or(ErrorCategory::OtherError)
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        let message = message.to_lowercase();
        if message.contains("certificate") || message.contains("tls") || message.contains("ssl") {
            Some(ErrorCategory::TlsError)
        } else if message.contains("timed out") || message.contains("timeout") {
            Some(ErrorCategory::TimeoutError)
        } else if message.contains("dns")
            || message.contains("resolve")
            || message.contains("connect")
        {
            Some(ErrorCategory::NetworkError)
        } else {
            None
        }
    }

    /// Short label used in log fields and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Human-readable description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Renders an error together with its `source()` chain.
///
/// reqwest's top-level message is often just "error sending request"; the
/// useful part (connection refused, dns error) lives further down the chain.
pub fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Reason phrase for the status codes a load test usually sees.
pub fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        0 => "Request Failed",

        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",

        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",

        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        429 => "Too Many Requests",

        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",

        _ => "Unknown Status",
    }
}

/// Configuration faults. These abort the run before any worker starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Target URL is required")]
    MissingUrl,

    #[error("Invalid target URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Field '{field}': '{value}' is not a valid number")]
    NotANumber { field: String, value: String },

    #[error("Field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid {field} format: '{value}'. {message}")]
    InvalidDuration {
        field: String,
        value: String,
        message: String,
    },
}
