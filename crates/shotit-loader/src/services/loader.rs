//! Paced batch ingestion into the vector store.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bon::Builder;
use shotit_store::{CollectionSchema, IndexRecord, IndexSpec, StoreError, VectorStore};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::constants::{DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE, INDEX_NLIST};

#[derive(Debug, Error, Clone)]
pub enum LoadError {
    #[error("insert of batch {batch} failed: {source}")]
    Insert {
        batch: usize,
        #[source]
        source: StoreError,
    },
    #[error("flush failed: {0}")]
    Flush(#[source] StoreError),
    #[error("index build failed: {0}")]
    Index(#[source] StoreError),
}

#[derive(Debug, Clone, Builder)]
pub struct LoaderOptions {
    #[builder(into)]
    pub collection: String,
    #[builder(default = NonZeroUsize::new(DEFAULT_BATCH_SIZE).expect("default batch size is non-zero"))]
    pub batch_size: NonZeroUsize,
    #[builder(default = Duration::from_millis(DEFAULT_BATCH_PAUSE_MS))]
    pub batch_pause: Duration,
    #[builder(default = IndexSpec::ivf_sq8_inner_product(INDEX_NLIST))]
    pub index: IndexSpec,
}

/// What one load did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub batches: usize,
    pub inserted: u64,
}

pub struct BatchLoader {
    store: Arc<dyn VectorStore>,
    options: LoaderOptions,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn VectorStore>, options: LoaderOptions) -> Self {
        Self { store, options }
    }

    /// Inserts `records` in order, `batch_size` at a time with a pause after
    /// every batch but the last, then flushes and rebuilds the vector index.
    pub async fn load(&self, records: &[IndexRecord]) -> Result<LoadReport, LoadError> {
        let collection = self.options.collection.as_str();
        let batch_size = self.options.batch_size.get();
        let total_batches = records.len().div_ceil(batch_size);
        let mut report = LoadReport::default();

        let started = Instant::now();
        for (batch, chunk) in records.chunks(batch_size).enumerate() {
            debug_assert!(chunk.len() <= batch_size);
            let inserted = self
                .store
                .insert(collection, chunk)
                .await
                .map_err(|source| LoadError::Insert { batch, source })?;
            report.batches += 1;
            report.inserted += inserted;
            if batch + 1 < total_batches && !self.options.batch_pause.is_zero() {
                sleep(self.options.batch_pause).await;
            }
        }
        debug_assert_eq!(report.batches, total_batches);
        info!(
            collection,
            records = records.len(),
            batches = report.batches,
            elapsed_ms = started.elapsed().as_millis(),
            "insert done"
        );

        let started = Instant::now();
        self.store
            .flush(collection)
            .await
            .map_err(LoadError::Flush)?;
        info!(collection, elapsed_ms = started.elapsed().as_millis(), "flush done");

        let started = Instant::now();
        self.store
            .create_index(collection, &self.options.index)
            .await
            .map_err(LoadError::Index)?;
        info!(
            collection,
            index = %self.options.index.index_name(),
            elapsed_ms = started.elapsed().as_millis(),
            "index done"
        );

        Ok(report)
    }
}

/// Releases and drops `schema.name` when present, then creates it.
///
/// Destroys any vectors already loaded into the collection.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    schema: &CollectionSchema,
) -> Result<(), StoreError> {
    let name = schema.name.as_str();
    if store.has_collection(name).await? {
        warn!(collection = name, "recreating existing collection; loaded vectors are discarded");
        store.release_collection(name).await?;
        store.drop_collection(name).await?;
    }
    store.create_collection(schema).await?;
    info!(
        collection = name,
        dimension = ?schema.vector_dim(),
        "collection ready"
    );
    Ok(())
}
