use std::sync::Arc;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by a [`crate::VectorStore`] implementation.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("invalid store URL `{0}`")]
    InvalidUrl(String),
    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("unexpected HTTP status {status} during `{stage}`")]
    HttpStatus { stage: &'static str, status: u16 },
    #[error("store rejected `{stage}` with code {code}: {message}")]
    Api {
        stage: &'static str,
        code: i64,
        message: String,
    },
    #[error("malformed store response during `{stage}`: {message}")]
    Decode {
        stage: &'static str,
        message: String,
    },
    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn request(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Request {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn decode(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            stage,
            message: message.into(),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}
