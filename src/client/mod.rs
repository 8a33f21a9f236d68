//! Concurrent workload driver.
//!
//! Spawns `parallel` workers, each running `connections` sequential cycles
//! against the server, and folds their outcomes into one result:
//! - a rejected checksum stops that worker and fails the run;
//! - any connection or I/O error aborts every worker immediately.

pub mod worker;

pub use worker::{exchange, run_cycle, run_worker};

use crate::config::ClientConfig;
use crate::error::ClientError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Request size ceiling assigned to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Sizes in `[0, max_request_size)`.
    Large,
    /// Sizes in `[0, small_request_size)`.
    Small,
}

impl WorkerMode {
    /// Pick a mode, `Large` with probability `large_ratio`.
    pub fn choose<R: Rng>(large_ratio: f64, rng: &mut R) -> Self {
        if rng.gen_bool(large_ratio) {
            WorkerMode::Large
        } else {
            WorkerMode::Small
        }
    }

    /// Exclusive upper bound on request sizes for this mode.
    pub fn ceiling(&self, config: &ClientConfig) -> u64 {
        match self {
            WorkerMode::Large => config.max_request_size,
            WorkerMode::Small => config.small_request_size,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// True when every worker completed all cycles with `OKOK`.
    pub success: bool,
    pub workers: usize,
    pub failed_workers: usize,
    pub cycles_completed: u64,
    pub elapsed: Duration,
}

/// Drive the configured workload to completion.
///
/// Returns the first fatal error, if any, after aborting the remaining workers.
/// Settings that fail [`ClientConfig::validate`] are rejected before any
/// worker starts.
pub async fn run(config: ClientConfig) -> Result<RunReport, ClientError> {
    config.validate()?;
    let config = Arc::new(config);
    let completed = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    info!(
        server = %config.target,
        workers = config.parallel,
        connections = config.connections,
        "Starting workload"
    );

    let mut rng = StdRng::from_entropy();
    let mut workers = JoinSet::new();
    for id in 0..config.parallel {
        let mode = WorkerMode::choose(config.large_ratio, &mut rng);
        workers.spawn(run_worker(
            id,
            Arc::clone(&config),
            mode,
            Arc::clone(&completed),
        ));
    }

    let reporter = config.progress_interval.map(|interval| {
        let total = planned_cycles(&config);
        tokio::spawn(report_progress(Arc::clone(&completed), total, interval))
    });

    let outcome = collect(&mut workers).await;

    if let Some(reporter) = reporter {
        reporter.abort();
    }

    let failed_workers = outcome?;
    let report = RunReport {
        success: failed_workers == 0,
        workers: config.parallel,
        failed_workers,
        cycles_completed: completed.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };

    info!(
        success = report.success,
        failed_workers = report.failed_workers,
        cycles = report.cycles_completed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Workload finished"
    );

    Ok(report)
}

/// Cycles the whole run would complete, saturating at `u64::MAX`.
fn planned_cycles(config: &ClientConfig) -> u64 {
    (config.parallel as u64).saturating_mul(config.connections as u64)
}

/// Wait for every worker, returning how many reported failure.
async fn collect(workers: &mut JoinSet<Result<bool, ClientError>>) -> Result<usize, ClientError> {
    let mut failed = 0;

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => failed += 1,
            Ok(Err(e)) => {
                error!(error = %e, "Worker hit a fatal error, aborting run");
                workers.abort_all();
                return Err(e);
            }
            Err(e) => {
                workers.abort_all();
                return Err(ClientError::Worker(e.to_string()));
            }
        }
    }

    debug!(failed, "All workers reported");
    Ok(failed)
}

/// Background task logging completed cycles
async fn report_progress(completed: Arc<AtomicU64>, total: u64, interval: Duration) {
    let mut interval = tokio::time::interval(interval);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let done = completed.load(Ordering::Relaxed);
        info!(completed = done, total, "Progress");
    }
}
