#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shotit_loader::config::{MediaConfig, WorkerConfig};
use shotit_loader::services::WorkerDeps;
use shotit_store::{
    CollectionSchema, IndexRecord, IndexSpec, StoreConnector, StoreError, StoreResult, VectorStore,
};
use xz2::write::XzEncoder;

pub const SECRET: &str = "s3cret";

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Has(String),
    Release(String),
    Drop(String),
    Create(String),
    Insert { collection: String, rows: usize },
    Flush(String),
    CreateIndex { collection: String, index: IndexSpec },
}

/// In-memory store that records every call and can fail a number of inserts.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    inserted: Mutex<Vec<IndexRecord>>,
    collections: Mutex<HashSet<String>>,
    insert_failures: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_inserts(&self, count: usize) {
        self.insert_failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn inserted(&self) -> Vec<IndexRecord> {
        self.inserted.lock().expect("inserted lock").clone()
    }

    pub fn insert_batches(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Insert { rows, .. } => Some(rows),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn has_collection(&self, collection: &str) -> StoreResult<bool> {
        self.record(StoreCall::Has(collection.to_string()));
        Ok(self
            .collections
            .lock()
            .expect("collections lock")
            .contains(collection))
    }

    async fn release_collection(&self, collection: &str) -> StoreResult<()> {
        self.record(StoreCall::Release(collection.to_string()));
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> StoreResult<()> {
        self.record(StoreCall::Drop(collection.to_string()));
        self.collections
            .lock()
            .expect("collections lock")
            .remove(collection);
        self.inserted.lock().expect("inserted lock").clear();
        Ok(())
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> StoreResult<()> {
        self.record(StoreCall::Create(schema.name.clone()));
        self.collections
            .lock()
            .expect("collections lock")
            .insert(schema.name.clone());
        Ok(())
    }

    async fn insert(&self, collection: &str, records: &[IndexRecord]) -> StoreResult<u64> {
        self.record(StoreCall::Insert {
            collection: collection.to_string(),
            rows: records.len(),
        });
        let remaining = self.insert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.insert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::message("simulated insert failure"));
        }
        self.inserted
            .lock()
            .expect("inserted lock")
            .extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn flush(&self, collection: &str) -> StoreResult<()> {
        self.record(StoreCall::Flush(collection.to_string()));
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        self.record(StoreCall::CreateIndex {
            collection: collection.to_string(),
            index: index.clone(),
        });
        Ok(())
    }
}

/// Hands out the same recording store to every caller.
pub struct SharedConnector(pub Arc<RecordingStore>);

impl StoreConnector for SharedConnector {
    fn connect(&self) -> StoreResult<Arc<dyn VectorStore>> {
        Ok(self.0.clone())
    }
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        collection: "frames".to_string(),
        dimension: 8,
        batch_pause_ms: 0,
        retry_delay_ms: 10,
        reconnect_delay_ms: 20,
        ..WorkerConfig::default()
    }
}

pub fn deps(api_url: &str, store: &Arc<RecordingStore>, worker: WorkerConfig) -> Arc<WorkerDeps> {
    let mut media = MediaConfig::with_api_url(api_url);
    media.secret = SECRET.to_string();
    Arc::new(WorkerDeps::new(
        media,
        Arc::new(SharedConnector(store.clone())),
        worker,
    ))
}

/// Solr-style `<add>` document from `(time, cl_hi, cl_ha)` triples.
pub fn hash_document(frames: &[(f64, &str, &str)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><add>"#);
    for (time, structural, histogram) in frames {
        xml.push_str(&format!(
            r#"<doc><field name="id">{time}</field><field name="cl_hi">{structural}</field><field name="cl_ha">{histogram}</field></doc>"#
        ));
    }
    xml.push_str("</add>");
    xml
}

pub fn xz(document: &str) -> Vec<u8> {
    let mut encoder = XzEncoder::new(Vec::new(), 6);
    encoder
        .write_all(document.as_bytes())
        .expect("compress document");
    encoder.finish().expect("finish xz stream")
}
