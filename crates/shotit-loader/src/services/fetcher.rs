//! Hash artifact retrieval from the media API.

use std::io::Read;
use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;
use xz2::read::XzDecoder;
use xz2::stream::Stream;

use crate::config::MediaConfig;
use crate::constants::SECRET_HEADER;
use crate::pipeline::Job;

const HASH_PREFIX: &str = "hash";
const LOADED_PREFIX: &str = "loaded";
const HASH_SUFFIX: &str = ".xml.xz";
const USER_AGENT: &str = concat!("shotit-loader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("invalid media API URL `{0}`")]
    InvalidBaseUrl(String),
    #[error("request error during `{stage}`: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("HTTP status {status} during `{stage}`: {body}")]
    HttpStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to read HTTP body during `{stage}`: {source}")]
    Body {
        stage: &'static str,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("failed to decompress hash document: {message}")]
    Decompress { message: String },
}

impl FetchError {
    pub fn request(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Request {
            stage,
            source: Arc::new(error),
        }
    }

    pub fn body(stage: &'static str, error: reqwest::Error) -> Self {
        Self::Body {
            stage,
            source: Arc::new(error),
        }
    }

    /// Rejections by the media API and corrupt artifacts will not improve on
    /// retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidBaseUrl(_) | Self::HttpStatus { .. } | Self::Decompress { .. }
        )
    }
}

/// Client for `/hash/...` and `/loaded/...` on the media API.
#[derive(Debug, Clone)]
pub struct HashFetcher {
    http: Client,
    base: Url,
    secret: String,
}

impl HashFetcher {
    pub fn new(media: &MediaConfig) -> Result<Self, FetchError> {
        let base = Url::parse(media.api_url.trim())
            .map_err(|_| FetchError::InvalidBaseUrl(media.api_url.clone()))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::InvalidBaseUrl(media.api_url.clone()));
        }

        let http = Client::builder()
            .timeout(media.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::request("build_client", err))?;

        Ok(Self {
            http,
            base,
            secret: media.secret.clone(),
        })
    }

    /// `<base>/hash/<collectionID>/<fileName>.xml.xz`, file name percent-encoded.
    pub fn hash_url(&self, job: &Job) -> Result<Url, FetchError> {
        let file = format!("{}{HASH_SUFFIX}", job.file_name());
        self.job_url(HASH_PREFIX, job.collection_id(), &file)
    }

    /// `<base>/loaded/<collectionID>/<fileName>`
    pub fn loaded_url(&self, job: &Job) -> Result<Url, FetchError> {
        self.job_url(LOADED_PREFIX, job.collection_id(), job.file_name())
    }

    fn job_url(&self, prefix: &str, collection_id: &str, file: &str) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend([prefix, collection_id, file]);
        Ok(url)
    }

    /// Downloads and decompresses the job's hash document.
    pub async fn fetch(&self, job: &Job) -> Result<Vec<u8>, FetchError> {
        let compressed = self.fetch_compressed(job).await?;
        let document = decompress(&compressed)?;
        debug!(
            job = %job,
            compressed = compressed.len(),
            bytes = document.len(),
            "hash document decompressed"
        );
        Ok(document)
    }

    pub async fn fetch_compressed(&self, job: &Job) -> Result<Vec<u8>, FetchError> {
        let stage = "fetch_hash";
        let url = self.hash_url(job)?;
        debug!(job = %job, %url, "downloading hash document");

        let response = self
            .http
            .get(url)
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await
            .map_err(|err| FetchError::request(stage, err))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            warn!(job = %job, status = status.as_u16(), %body, "hash download rejected");
            return Err(FetchError::HttpStatus {
                stage,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchError::body(stage, err))?;
        Ok(bytes.to_vec())
    }

    /// Tells the media API the job's vectors are in the store.
    pub async fn notify_loaded(&self, job: &Job) -> Result<(), FetchError> {
        let stage = "notify_loaded";
        let url = self.loaded_url(job)?;
        let response = self
            .http
            .get(url)
            .header(SECRET_HEADER, &self.secret)
            .send()
            .await
            .map_err(|err| FetchError::request(stage, err))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                stage,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Decodes an `.xz` (or legacy `.lzma`) payload.
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, FetchError> {
    let stream = Stream::new_auto_decoder(u64::MAX, 0).map_err(|err| FetchError::Decompress {
        message: err.to_string(),
    })?;
    let mut decoder = XzDecoder::new_stream(compressed, stream);
    let mut document = Vec::with_capacity(compressed.len().saturating_mul(4));
    decoder
        .read_to_end(&mut document)
        .map_err(|err| FetchError::Decompress {
            message: err.to_string(),
        })?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use xz2::write::XzEncoder;

    use super::*;

    fn fetcher(base: &str) -> HashFetcher {
        HashFetcher::new(&MediaConfig::with_api_url(base)).expect("valid base url")
    }

    #[test]
    fn hash_url_encodes_file_name() {
        let job = Job::parse(r#"{"file":"21034/Show #1 ?.mp4"}"#).expect("valid job");
        let url = fetcher("http://media.local:3311").hash_url(&job).expect("url");
        assert_eq!(
            url.as_str(),
            "http://media.local:3311/hash/21034/Show%20%231%20%3F.mp4.xml.xz"
        );
    }

    #[test]
    fn loaded_url_keeps_base_path() {
        let job = Job::parse(r#"{"file":"7/a b.mkv"}"#).expect("valid job");
        let url = fetcher("http://media.local/api/").loaded_url(&job).expect("url");
        assert_eq!(url.as_str(), "http://media.local/api/loaded/7/a%20b.mkv");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            HashFetcher::new(&MediaConfig::with_api_url("not a url")),
            Err(FetchError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn decompresses_xz_payload() {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(b"<add></add>").expect("write");
        let compressed = encoder.finish().expect("finish");
        assert_eq!(decompress(&compressed).expect("valid xz"), b"<add></add>");
    }

    #[test]
    fn corrupt_payload_is_terminal() {
        let err = decompress(b"definitely not xz").unwrap_err();
        assert!(err.is_terminal());
    }
}
