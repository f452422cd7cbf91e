use crate::constants::{DEDUP_SPAN_SECS, DEDUP_WINDOW};
use crate::pipeline::FrameHashRecord;

/// Drops near-duplicate frames using the default window (24 accepted frames,
/// 2 seconds).
pub fn dedupe(records: Vec<FrameHashRecord>) -> Vec<FrameHashRecord> {
    dedupe_within(records, DEDUP_WINDOW, DEDUP_SPAN_SECS)
}

/// Sliding, bounded-lookback duplicate filter.
///
/// A record is dropped when one of the last `window` accepted records has the
/// same structural hash and lies less than `span_secs` away. Input must be
/// sorted by time; output is an order-preserving subsequence.
pub fn dedupe_within(
    records: Vec<FrameHashRecord>,
    window: usize,
    span_secs: f64,
) -> Vec<FrameHashRecord> {
    debug_assert!(span_secs >= 0.0);
    debug_assert!(records.windows(2).all(|pair| pair[0].time <= pair[1].time));

    let mut accepted: Vec<FrameHashRecord> = Vec::with_capacity(records.len());
    for current in records {
        let recent = &accepted[accepted.len().saturating_sub(window)..];
        let duplicate = recent.iter().any(|frame| {
            (current.time - frame.time).abs() < span_secs
                && frame.structural_hash == current.structural_hash
        });
        if !duplicate {
            accepted.push(current);
        }
    }
    accepted
}
