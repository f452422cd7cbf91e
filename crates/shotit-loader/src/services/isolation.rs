//! Per-job isolation units.
//!
//! Each job runs on its own OS thread with a single-threaded runtime and its
//! own store connection, and reports exactly one [`JobOutcome`] back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use thiserror::Error;
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::task;
use tracing::{debug, error, warn};

use crate::pipeline::Job;
use crate::services::worker::{JobOutcome, JobRunner, WorkerDeps};

static UNIT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("failed to spawn load unit thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

pub struct UnitHandle {
    job: Job,
    rx: Receiver<JobOutcome>,
    join: Option<JoinHandle<()>>,
    deps: Arc<WorkerDeps>,
}

pub fn spawn_unit(job: Job, deps: Arc<WorkerDeps>) -> Result<UnitHandle, IsolationError> {
    let (tx, rx) = flume::bounded(1);
    let seq = UNIT_SEQ.fetch_add(1, Ordering::Relaxed);
    let unit_job = job.clone();
    let unit_deps = deps.clone();

    let join = thread::Builder::new()
        .name(format!("shotit-load-{seq}"))
        .spawn(move || run_unit(unit_job, unit_deps, tx))
        .map_err(|source| IsolationError::Spawn { source })?;

    deps.status.job_started();
    debug!(job = %job, unit = seq, "load unit spawned");
    Ok(UnitHandle {
        job,
        rx,
        join: Some(join),
        deps,
    })
}

impl UnitHandle {
    /// Waits for the unit's single report, then joins its thread.
    ///
    /// A unit that dies without reporting is treated as a rejected job.
    pub async fn wait(self) -> (Job, JobOutcome) {
        let UnitHandle {
            job,
            rx,
            join,
            deps,
        } = self;

        let outcome = match rx.recv_async().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(job = %job, "load unit exited without reporting");
                deps.status.record_rejected();
                JobOutcome::Rejected {
                    reason: "load unit terminated abnormally".to_string(),
                }
            }
        };

        if let Some(join) = join {
            match task::spawn_blocking(move || join.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!(job = %job, "load unit panicked"),
                Err(err) => warn!(job = %job, error = %err, "failed to join load unit"),
            }
        }
        deps.status.job_finished();
        (job, outcome)
    }
}

fn run_unit(job: Job, deps: Arc<WorkerDeps>, tx: Sender<JobOutcome>) {
    let outcome = match RuntimeBuilder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(async {
            match JobRunner::new(&deps) {
                Ok(runner) => runner.run(&job).await,
                Err(err) => {
                    warn!(job = %job, error = %err, "failed to prepare job runner");
                    deps.status.record_rejected();
                    JobOutcome::Rejected {
                        reason: err.to_string(),
                    }
                }
            }
        }),
        Err(err) => {
            error!(job = %job, error = %err, "failed to build unit runtime");
            deps.status.record_rejected();
            JobOutcome::Rejected {
                reason: err.to_string(),
            }
        }
    };
    let _ = tx.send(outcome);
}
