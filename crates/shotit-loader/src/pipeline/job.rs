use serde::Deserialize;
use thiserror::Error;

/// One ingestion job pushed by the dispatcher.
///
/// The raw payload is kept verbatim because the acknowledgment echoes it back
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    raw: String,
    collection_id: String,
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct JobMessage {
    file: String,
}

#[derive(Debug, Error)]
pub enum JobParseError {
    #[error("job message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job file `{0}` is not of the form <collectionID>/<fileName>")]
    MissingSeparator(String),
    #[error("job file `{0}` has an empty collection id or file name")]
    EmptyComponent(String),
}

impl Job {
    pub fn parse(raw: impl Into<String>) -> Result<Self, JobParseError> {
        let raw = raw.into();
        let message: JobMessage = serde_json::from_str(&raw)?;
        let Some((collection_id, file_name)) = message.file.split_once('/') else {
            return Err(JobParseError::MissingSeparator(message.file.clone()));
        };
        if collection_id.trim().is_empty() || file_name.trim().is_empty() {
            return Err(JobParseError::EmptyComponent(message.file.clone()));
        }
        Ok(Self {
            collection_id: collection_id.to_string(),
            file_name: file_name.to_string(),
            raw,
        })
    }

    /// Verbatim message as received from the channel.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection_id, self.file_name)
    }
}
