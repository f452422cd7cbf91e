//! One job, end to end: fetch, parse, dedupe, normalize, load, notify.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use shotit_store::{IndexSpec, StoreConnector, StoreError};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{MediaConfig, WorkerConfig};
use crate::constants::INDEX_NLIST;
use crate::pipeline::{
    HashParseError, Job, NormalizeError, build_index_records, dedupe, normalize_records,
    parse_hash_document,
};
use crate::services::fetcher::{FetchError, HashFetcher};
use crate::services::loader::{BatchLoader, LoadError, LoadReport, LoaderOptions};
use crate::services::status::WorkerStatus;

#[derive(Debug, Error, Clone)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("hash document rejected: {0}")]
    Parse(Arc<HashParseError>),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("store connection failed: {0}")]
    Connect(#[source] StoreError),
}

impl From<HashParseError> for JobError {
    fn from(value: HashParseError) -> Self {
        Self::Parse(Arc::new(value))
    }
}

impl JobError {
    /// Network and store failures retry the whole job; bad input never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => !err.is_terminal(),
            Self::Parse(_) | Self::Normalize(_) => false,
            Self::Load(_) | Self::Connect(_) => true,
        }
    }
}

/// Final state of a job, reported once per unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Loaded { frames: usize, inserted: u64 },
    Rejected { reason: String },
}

impl JobOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

/// Everything a job runner needs, shared by reference between units.
pub struct WorkerDeps {
    pub media: MediaConfig,
    pub connector: Arc<dyn StoreConnector>,
    pub worker: WorkerConfig,
    pub status: Arc<WorkerStatus>,
}

impl WorkerDeps {
    pub fn new(
        media: MediaConfig,
        connector: Arc<dyn StoreConnector>,
        worker: WorkerConfig,
    ) -> Self {
        Self {
            media,
            connector,
            worker,
            status: Arc::new(WorkerStatus::default()),
        }
    }

    pub fn loader_options(&self) -> LoaderOptions {
        let batch_size = NonZeroUsize::new(self.worker.batch_size).unwrap_or(NonZeroUsize::MIN);
        LoaderOptions::builder()
            .collection(self.worker.collection.clone())
            .batch_size(batch_size)
            .batch_pause(self.worker.batch_pause())
            .index(IndexSpec::ivf_sq8_inner_product(INDEX_NLIST))
            .build()
    }
}

pub struct JobRunner {
    fetcher: HashFetcher,
    loader: BatchLoader,
    dimension: usize,
    normalize_chunk: usize,
    retry_delay: Duration,
    status: Arc<WorkerStatus>,
}

impl JobRunner {
    /// Opens this runner's own media client and store connection.
    pub fn new(deps: &WorkerDeps) -> Result<Self, JobError> {
        let fetcher = HashFetcher::new(&deps.media)?;
        let store = deps.connector.connect().map_err(JobError::Connect)?;
        Ok(Self {
            fetcher,
            loader: BatchLoader::new(store, deps.loader_options()),
            dimension: deps.worker.dimension,
            normalize_chunk: deps.worker.normalize_chunk,
            retry_delay: deps.worker.retry_delay(),
            status: deps.status.clone(),
        })
    }

    /// Runs `job` until it is loaded or rejected. Retryable failures start
    /// over from the download after a fixed delay, without limit.
    pub async fn run(&self, job: &Job) -> JobOutcome {
        let backoff = ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(usize::MAX);

        let result = (|| self.attempt(job))
            .retry(backoff)
            .sleep(sleep)
            .when(JobError::is_retryable)
            .notify(|err: &JobError, delay: Duration| {
                self.status.record_retry();
                warn!(
                    job = %job,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "job failed; retrying from the top"
                );
            })
            .await;

        match result {
            Ok((frames, report)) => {
                if let Err(err) = self.fetcher.notify_loaded(job).await {
                    warn!(job = %job, error = %err, "failed to notify media API of load");
                }
                self.status.record_loaded();
                info!(job = %job, frames, inserted = report.inserted, "loaded");
                JobOutcome::Loaded {
                    frames,
                    inserted: report.inserted,
                }
            }
            Err(err) => {
                self.status.record_rejected();
                warn!(job = %job, error = %err, "job rejected without loading");
                JobOutcome::Rejected {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn attempt(&self, job: &Job) -> Result<(usize, LoadReport), JobError> {
        let document = self.fetcher.fetch(job).await?;
        let parsed = parse_hash_document(&document)?;
        let total = parsed.len();
        let frames = dedupe(parsed);
        debug!(job = %job, total, kept = frames.len(), "frames deduplicated");

        let batch = normalize_records(&frames, self.dimension, self.normalize_chunk)?;
        if batch.truncated > 0 {
            warn!(
                job = %job,
                truncated = batch.truncated,
                dimension = self.dimension,
                "histogram hashes longer than the vector dimension were truncated"
            );
        }

        let records = build_index_records(job, &frames, batch.vectors);
        info!(job = %job, records = records.len(), "uploading vectors");
        let report = self.loader.load(&records).await?;
        Ok((frames.len(), report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_input_is_not_retryable() {
        let http = JobError::Fetch(FetchError::HttpStatus {
            stage: "fetch_hash",
            status: 404,
            body: String::new(),
        });
        assert!(!http.is_retryable());
        assert!(!JobError::Normalize(NormalizeError::ZeroDimension).is_retryable());
        assert!(!JobError::from(HashParseError::MissingField { doc: 0, field: "id" }).is_retryable());
    }

    #[test]
    fn store_failures_are_retryable() {
        let err = JobError::Load(LoadError::Flush(StoreError::message("down")));
        assert!(err.is_retryable());
    }
}
