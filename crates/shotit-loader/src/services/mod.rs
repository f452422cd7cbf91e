//! Orchestration layer for IO-bound worker services.
//!
//! Modules here talk to the media API, the dispatcher channel, and the vector
//! store. Pure transforms belong in `crate::pipeline`.

pub mod channel;
pub mod fetcher;
pub mod isolation;
pub mod loader;
pub mod maintenance;
pub mod status;
pub mod worker;

pub use channel::{ChannelError, JobChannel, channel_url};
pub use fetcher::{FetchError, HashFetcher, decompress};
pub use isolation::{IsolationError, UnitHandle, spawn_unit};
pub use loader::{BatchLoader, LoadError, LoadReport, LoaderOptions, ensure_collection};
pub use maintenance::{FlushSchedule, FlushScheduleError, flush_once, run_scheduled_flush};
pub use status::{StatusSnapshot, WorkerStatus};
pub use worker::{JobError, JobOutcome, JobRunner, WorkerDeps};
