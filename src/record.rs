//! The outcome of one request attempt.

use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Status code recorded when a request failed before any response arrived.
pub const STATUS_REQUEST_FAILED: u16 = 0;

/// One request attempt, immutable once built.
///
/// The two constructors are the only way to create a record, which keeps
/// `success` consistent with `status_code` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    user_id: usize,
    status_code: u16,
    #[serde(rename = "response_time_secs", serialize_with = "as_secs_f64")]
    response_time: Duration,
    success: bool,
    timestamp: SystemTime,
    content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResultRecord {
    /// A request that got an HTTP response. Only 200 counts as success.
    pub fn response(
        user_id: usize,
        status_code: u16,
        content_length: u64,
        response_time: Duration,
    ) -> Self {
        Self {
            user_id,
            status_code,
            response_time,
            success: status_code == 200,
            timestamp: SystemTime::now(),
            content_length,
            error: None,
        }
    }

    /// A request that failed at the transport level.
    pub fn failure(user_id: usize, error: impl Into<String>, response_time: Duration) -> Self {
        Self {
            user_id,
            status_code: STATUS_REQUEST_FAILED,
            response_time,
            success: false,
            timestamp: SystemTime::now(),
            content_length: 0,
            error: Some(error.into()),
        }
    }

    pub fn user_id(&self) -> usize {
        self.user_id
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn response_time(&self) -> Duration {
        self.response_time
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

fn as_secs_f64<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
