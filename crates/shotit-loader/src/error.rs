//! Application-level error type shared by the binary and its subcommands.

use thiserror::Error;

use crate::config;
use crate::pipeline::JobParseError;
use crate::server;
use crate::services::{ChannelError, IsolationError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error(transparent)]
    Server(#[from] server::ServerError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("invalid job: {0}")]
    JobInput(#[from] JobParseError),
    #[error(transparent)]
    Isolation(#[from] IsolationError),
    #[error(transparent)]
    Store(#[from] shotit_store::StoreError),
    #[error("refusing to recreate collection `{0}` without --yes")]
    ConfirmationRequired(String),
    #[error("job `{job}` was rejected: {reason}")]
    Rejected { job: String, reason: String },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
