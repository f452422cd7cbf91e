use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide worker counters, shared between the channel loop, the job
/// runner and the health endpoint.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    connected: AtomicBool,
    in_flight: AtomicU64,
    loaded: AtomicU64,
    rejected: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub connected: bool,
    pub in_flight: u64,
    pub loaded: u64,
    pub rejected: u64,
    pub retries: u64,
}

impl WorkerStatus {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "job_finished without job_started");
    }

    pub fn record_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            loaded: self.loaded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
