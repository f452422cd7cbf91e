//! Cross-cutting application constants.

/// Collection the worker loads into unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "shotit";

/// Dimensionality of the normalized histogram vector.
pub const DEFAULT_VECTOR_DIM: usize = 100;

/// Rows per insert call.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Pause between inserts; keeps the store under its concurrent request ceiling.
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 1_000;

/// Fixed delay before a failed job is retried from the top.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 30_000;

/// Fixed delay before the job channel reconnects.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Records normalized per parallel work item.
pub const DEFAULT_NORMALIZE_CHUNK: usize = 2_048;

pub const DEFAULT_WORKER_TYPE: &str = "load";

/// Shared secret header understood by the media API and the dispatcher.
pub const SECRET_HEADER: &str = "x-trace-secret";

pub const WORKER_TYPE_HEADER: &str = "x-trace-worker-type";

/// Accepted records each frame is compared against during deduplication.
pub const DEDUP_WINDOW: usize = 24;

/// Frames closer than this (seconds) with the same structural hash are duplicates.
pub const DEDUP_SPAN_SECS: f64 = 2.0;

/// `nlist` of the IVF_SQ8 index rebuilt after each load.
pub const INDEX_NLIST: u32 = 128;
