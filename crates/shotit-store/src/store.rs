use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::milvus::MilvusRestStore;
use crate::schema::{CollectionSchema, IndexRecord, IndexSpec};

/// Operations the load worker needs from the similarity index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn has_collection(&self, collection: &str) -> StoreResult<bool>;

    /// Release the in-memory handle of a loaded collection.
    async fn release_collection(&self, collection: &str) -> StoreResult<()>;

    async fn drop_collection(&self, collection: &str) -> StoreResult<()>;

    async fn create_collection(&self, schema: &CollectionSchema) -> StoreResult<()>;

    /// Insert one batch; returns the number of rows the store accepted.
    async fn insert(&self, collection: &str, records: &[IndexRecord]) -> StoreResult<u64>;

    /// Force buffered writes to durable segments and wait for completion.
    async fn flush(&self, collection: &str) -> StoreResult<()>;

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;
}

/// Opens a fresh store client. Every job opens its own connection so no
/// client is shared between concurrently running jobs.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> StoreResult<Arc<dyn VectorStore>>;
}

impl StoreConnector for StoreConfig {
    fn connect(&self) -> StoreResult<Arc<dyn VectorStore>> {
        Ok(Arc::new(MilvusRestStore::new(self)?))
    }
}
