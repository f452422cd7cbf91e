//! Pure pipeline transformations that operate on hash documents and frames.
//!
//! Modules under this namespace must remain free of IO and external side effects
//! so they can run inside isolation units and test harnesses alike.

pub mod dedup;
pub mod job;
pub mod normalize;
pub mod parse;
pub mod records;

pub use dedup::{dedupe, dedupe_within};
pub use job::{Job, JobParseError};
pub use normalize::{NormalizeError, NormalizedBatch, normalize, normalize_records};
pub use parse::{HashParseError, parse_hash_document};
pub use records::{build_index_records, primary_key, record_id};
pub use shotit_store::IndexRecord;

/// One frame's hashes as read from the hash document.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHashRecord {
    /// Offset into the video, in seconds.
    pub time: f64,
    /// Exact-match fingerprint; identity key for deduplication.
    pub structural_hash: String,
    /// Whitespace separated hex tokens the similarity vector is built from.
    pub histogram_hash: String,
}
