use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::errors::ErrorCategory;
use crate::metrics::{
    ACTIVE_VIRTUAL_USERS, CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS,
    REQUEST_ERRORS_BY_CATEGORY, REQUEST_STATUS_CODES, REQUEST_TOTAL,
};
use crate::record::ResultRecord;
use crate::session::{SessionError, SessionFactory};
use crate::sink::ResultSink;

/// Faults that end one virtual user early. Request failures are not faults.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("virtual user {user_id} could not open an HTTP session: {source}")]
    Session {
        user_id: usize,
        #[source]
        source: SessionError,
    },
}

/// Everything a virtual user needs besides its id.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<RunConfig>,
    pub sessions: Arc<dyn SessionFactory>,
    pub sink: ResultSink,
    /// Shared by all virtual users of a run; the duration bound is measured from it.
    pub run_start: Instant,
    pub cancel: CancellationToken,
}

/// Why a virtual user stopped issuing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    RequestCap,
    DurationElapsed,
    Cancelled,
}

/// Simulates one user: up to `requests_per_user` GETs with think time between them.
///
/// Every completed attempt is appended to the sink. A request still in flight
/// when the run is cancelled is abandoned and not recorded. Returns how many
/// records this user produced.
pub async fn run_virtual_user(user_id: usize, ctx: WorkerContext) -> Result<usize, WorkerError> {
    let config = &ctx.config;
    let session = ctx
        .sessions
        .create_session(user_id)
        .map_err(|source| WorkerError::Session { user_id, source })?;

    let _active = ActiveUserGuard::new();
    debug!(user_id = user_id, url = %config.target_url, "Virtual user starting");

    let mut issued = 0usize;
    let mut stop_reason = StopReason::RequestCap;

    for request_num in 0..config.requests_per_user {
        let elapsed = ctx.run_start.elapsed();
        if elapsed >= config.duration {
            stop_reason = StopReason::DurationElapsed;
            break;
        }
        if ctx.cancel.is_cancelled() {
            stop_reason = StopReason::Cancelled;
            break;
        }

        CONCURRENT_REQUESTS.inc();
        let request_start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            outcome = session.get(&config.target_url) => Some(outcome),
        };
        let response_time = request_start.elapsed();
        CONCURRENT_REQUESTS.dec();

        let Some(outcome) = outcome else {
            debug!(user_id = user_id, "In-flight request abandoned on cancellation");
            stop_reason = StopReason::Cancelled;
            break;
        };

        REQUEST_TOTAL.inc();
        REQUEST_DURATION_SECONDS.observe(response_time.as_secs_f64());

        let record = match outcome {
            Ok(response) => {
                REQUEST_STATUS_CODES
                    .with_label_values(&[status_code_label(response.status)])
                    .inc();
                if let Some(category) = ErrorCategory::from_status_code(response.status) {
                    REQUEST_ERRORS_BY_CATEGORY
                        .with_label_values(&[category.label()])
                        .inc();
                }
                debug!(
                    user_id = user_id,
                    status_code = response.status,
                    content_length = response.content_length,
                    response_time_ms = response_time.as_millis() as u64,
                    "Request completed"
                );
                ResultRecord::response(
                    user_id,
                    response.status,
                    response.content_length,
                    response_time,
                )
            }
            Err(e) => {
                REQUEST_STATUS_CODES.with_label_values(&["error"]).inc();
                REQUEST_ERRORS_BY_CATEGORY
                    .with_label_values(&[e.category.label()])
                    .inc();
                debug!(
                    user_id = user_id,
                    error = %e,
                    error_category = %e.category.label(),
                    "Request failed"
                );
                ResultRecord::failure(user_id, e.message, response_time)
            }
        };
        ctx.sink.append(record);
        issued += 1;

        if request_num + 1 < config.requests_per_user {
            let pause = think_time(config.think_time_min, config.think_time_max);
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                _ = time::sleep(pause) => {}
            }
        }
    }

    debug!(
        user_id = user_id,
        requests = issued,
        reason = ?stop_reason,
        elapsed_secs = ctx.run_start.elapsed().as_secs_f64(),
        "Virtual user finished"
    );
    Ok(issued)
}

/// Uniform random pause in `[min, max)`; `min` when the range is empty.
pub fn think_time(min: Duration, max: Duration) -> Duration {
    if min >= max {
        if min > max {
            warn!(min = ?min, max = ?max, "Think time range is inverted, using minimum");
        }
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

/// Static label for common status codes, keeping metric cardinality bounded.
fn status_code_label(code: u16) -> &'static str {
    match code {
        200 => "200",
        201 => "201",
        204 => "204",
        301 => "301",
        302 => "302",
        304 => "304",
        400 => "400",
        401 => "401",
        403 => "403",
        404 => "404",
        429 => "429",
        500 => "500",
        502 => "502",
        503 => "503",
        504 => "504",
        _ => "other",
    }
}

struct ActiveUserGuard;

impl ActiveUserGuard {
    fn new() -> Self {
        ACTIVE_VIRTUAL_USERS.inc();
        ActiveUserGuard
    }
}

impl Drop for ActiveUserGuard {
    fn drop(&mut self) {
        ACTIVE_VIRTUAL_USERS.dec();
    }
}
