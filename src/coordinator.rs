//! Run lifecycle: validate, launch one task per virtual user, join, report.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::errors::ConfigError;
use crate::record::ResultRecord;
use crate::report::RunReport;
use crate::session::SessionFactory;
use crate::sink::ResultSink;
use crate::worker::{run_virtual_user, WorkerContext, WorkerError};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Everything a finished (or interrupted) run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<ResultRecord>,
    pub total_duration: Duration,
    /// Virtual users that ended on a fault rather than a stop condition.
    pub faulted_workers: usize,
    /// True when the run was cancelled by the operator.
    pub interrupted: bool,
}

impl RunOutcome {
    /// Statistics over the collected records; `None` when there are none.
    pub fn report(&self) -> Option<RunReport> {
        RunReport::from_records(&self.records, self.total_duration)
    }
}

/// Owns one run end to end.
pub struct LoadCoordinator {
    config: Arc<RunConfig>,
    sessions: Arc<dyn SessionFactory>,
}

impl LoadCoordinator {
    pub fn new(config: RunConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }

    /// Runs every virtual user to completion and collects their records.
    ///
    /// The configuration is validated before anything is spawned. Exactly
    /// `num_users` tasks run concurrently; a faulted or panicking task is
    /// logged and does not affect the others. The sink is read only after
    /// every task has been joined.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunOutcome, ConfigError> {
        self.config.validate()?;

        let sink = ResultSink::new();
        let run_start = Instant::now();
        info!(
            url = %self.config.target_url,
            users = self.config.num_users,
            duration_secs = self.config.duration.as_secs_f64(),
            requests_per_user = self.config.requests_per_user,
            "Launching virtual users"
        );

        let ctx = WorkerContext {
            config: self.config.clone(),
            sessions: self.sessions.clone(),
            sink: sink.clone(),
            run_start,
            cancel: cancel.clone(),
        };

        let handles: Vec<(usize, JoinHandle<Result<usize, WorkerError>>)> = (0..self
            .config
            .num_users)
            .map(|user_id| (user_id, tokio::spawn(run_virtual_user(user_id, ctx.clone()))))
            .collect();
        drop(ctx);

        let progress = tokio::spawn(log_progress(sink.clone(), run_start));

        let mut faulted_workers = 0;
        for (user_id, handle) in handles {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!(user_id = user_id, error = %e, "Virtual user failed");
                    faulted_workers += 1;
                }
                Err(e) => {
                    error!(user_id = user_id, error = %e, "Virtual user task aborted");
                    faulted_workers += 1;
                }
            }
        }
        progress.abort();

        let total_duration = run_start.elapsed();
        let records = sink.snapshot();
        let interrupted = cancel.is_cancelled();
        info!(
            records = records.len(),
            faulted_workers = faulted_workers,
            interrupted = interrupted,
            total_duration_secs = total_duration.as_secs_f64(),
            "All virtual users joined"
        );

        Ok(RunOutcome {
            records,
            total_duration,
            faulted_workers,
            interrupted,
        })
    }
}

async fn log_progress(sink: ResultSink, run_start: Instant) {
    let mut ticker = time::interval_at(run_start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        ticker.tick().await;
        info!(
            completed_requests = sink.len(),
            elapsed_secs = run_start.elapsed().as_secs(),
            "Load test in progress"
        );
    }
}
