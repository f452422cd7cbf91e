//! Daily durability flush.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use shotit_store::{StoreConnector, StoreError};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::shutdown::Shutdown;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlushScheduleError {
    #[error("invalid flush time `{0}`, expected HH:MM")]
    InvalidTime(String),
}

/// A wall-clock time of day, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSchedule {
    at: NaiveTime,
}

impl FlushSchedule {
    pub fn parse(value: &str) -> Result<Self, FlushScheduleError> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(|at| Self { at })
            .map_err(|_| FlushScheduleError::InvalidTime(value.to_string()))
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }
}

/// Flushes `collection` through a fresh store connection.
pub async fn flush_once(connector: &dyn StoreConnector, collection: &str) -> Result<(), StoreError> {
    let store = connector.connect()?;
    let started = Instant::now();
    store.flush(collection).await?;
    info!(
        collection,
        elapsed_ms = started.elapsed().as_millis(),
        "scheduled flush done"
    );
    Ok(())
}

/// Runs [`flush_once`] every day at `schedule` until shutdown. Failures are
/// logged and the next day's flush is still attempted.
pub async fn run_scheduled_flush(
    connector: Arc<dyn StoreConnector>,
    collection: String,
    schedule: FlushSchedule,
    mut shutdown: Shutdown,
) {
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(collection = %collection, next = %next, "next scheduled flush");

        tokio::select! {
            _ = sleep(wait) => {
                if let Err(err) = flush_once(connector.as_ref(), &collection).await {
                    warn!(collection = %collection, error = %err, "scheduled flush failed");
                }
            }
            _ = shutdown.wait() => break,
        }
    }
}
