use shotit_store::IndexRecord;

use crate::pipeline::{FrameHashRecord, Job};

/// Sum of the UTF-16 code units of the structural hash.
///
/// Stable for a given hash but not collision resistant: permutations of the
/// same characters map to the same key.
pub fn primary_key(structural_hash: &str) -> i64 {
    structural_hash.encode_utf16().map(i64::from).sum()
}

/// `<collectionID>/<fileName>/<time with two decimals>`
pub fn record_id(job: &Job, time: f64) -> String {
    format!(
        "{}/{}/{}",
        job.collection_id(),
        job.file_name(),
        two_decimals(time)
    )
}

/// Two-decimal rendering of `value` that rounds exact ties away from zero.
///
/// `{:.2}` rounds the exact binary value half-to-even. The two only differ on
/// exact ties, and a double sits exactly halfway between hundredths only when
/// it is an odd multiple of 1/8. Values merely printed as ties (`1.005`) are
/// stored below or above the midpoint and keep the `{:.2}` result.
fn two_decimals(value: f64) -> String {
    let eighths = value * 8.0;
    let exact_tie = eighths.is_finite() && eighths.fract() == 0.0 && eighths % 2.0 != 0.0;
    if exact_tie {
        format!("{:.2}", (value * 100.0).round() / 100.0)
    } else {
        format!("{value:.2}")
    }
}

/// Pairs deduplicated frames with their vectors.
pub fn build_index_records(
    job: &Job,
    frames: &[FrameHashRecord],
    vectors: Vec<Vec<f32>>,
) -> Vec<IndexRecord> {
    debug_assert_eq!(frames.len(), vectors.len());
    frames
        .iter()
        .zip(vectors)
        .map(|(frame, vector)| IndexRecord {
            id: record_id(job, frame.time),
            vector,
            primary_key: primary_key(&frame.structural_hash),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_sums_char_codes() {
        assert_eq!(primary_key("ab"), 97 + 98);
        assert_eq!(primary_key("ab"), primary_key("ba"));
        assert_eq!(primary_key(""), 0);
    }

    #[test]
    fn record_id_uses_two_decimals() {
        let job = Job::parse(r#"{"file":"99/ep 01.mp4"}"#).expect("valid job");
        assert_eq!(record_id(&job, 12.0), "99/ep 01.mp4/12.00");
        assert_eq!(record_id(&job, 0.041_666), "99/ep 01.mp4/0.04");
    }

    #[test]
    fn exact_ties_round_up() {
        let job = Job::parse(r#"{"file":"1/a.mp4"}"#).expect("valid job");
        let ids: Vec<String> = [0.125, 0.375, 0.625, 2.625]
            .into_iter()
            .map(|time| record_id(&job, time))
            .collect();
        assert_eq!(
            ids,
            vec!["1/a.mp4/0.13", "1/a.mp4/0.38", "1/a.mp4/0.63", "1/a.mp4/2.63"]
        );
    }

    #[test]
    fn near_ties_follow_stored_value() {
        // 1.005 is stored just below the midpoint, 0.035 just above it.
        assert_eq!(two_decimals(1.005), "1.00");
        assert_eq!(two_decimals(0.035), "0.04");
        assert_eq!(two_decimals(0.5), "0.50");
        assert_eq!(two_decimals(3.0), "3.00");
    }

    #[test]
    fn builds_one_record_per_frame() {
        let job = Job::parse(r#"{"file":"1/a.mp4"}"#).expect("valid job");
        let frames = vec![
            FrameHashRecord {
                time: 0.5,
                structural_hash: "x".to_string(),
                histogram_hash: "1".to_string(),
            },
            FrameHashRecord {
                time: 3.25,
                structural_hash: "y".to_string(),
                histogram_hash: "2".to_string(),
            },
        ];
        let records = build_index_records(&job, &frames, vec![vec![1.0], vec![1.0]]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, "1/a.mp4/3.25");
        assert_eq!(records[1].primary_key, i64::from(b'y'));
    }
}
