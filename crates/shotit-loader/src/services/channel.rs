//! Persistent WebSocket connection to the job dispatcher.
//!
//! The dispatcher pushes `{"file": "<collectionID>/<fileName>"}` messages;
//! each one is handed to an isolation unit and echoed back verbatim once the
//! unit finishes, whatever the outcome.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use shotit_store::CollectionSchema;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{
    self, Message, client::IntoClientRequest, handshake::client::Request, http::HeaderValue,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::constants::{SECRET_HEADER, WORKER_TYPE_HEADER};
use crate::pipeline::Job;
use crate::services::isolation::spawn_unit;
use crate::services::loader::ensure_collection;
use crate::services::worker::WorkerDeps;
use crate::shutdown::Shutdown;

const CHANNEL_PATH: &str = "ws";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot derive a WebSocket URL from `{0}`")]
    InvalidUrl(String),
    #[error("header `{name}` has an invalid value")]
    InvalidHeader { name: &'static str },
    #[error("WebSocket connect failed: {0}")]
    Connect(#[source] Box<tungstenite::Error>),
    #[error("WebSocket send failed: {0}")]
    Send(#[source] Box<tungstenite::Error>),
    #[error("WebSocket receive failed: {0}")]
    Receive(#[source] Box<tungstenite::Error>),
}

/// How a connected session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Shutdown,
}

/// `http(s)://host/base` becomes `ws(s)://host/base/ws`.
pub fn channel_url(api_url: &str) -> Result<Url, ChannelError> {
    let trimmed = api_url.trim().trim_end_matches('/');
    let ws = if let Some(rest) = trimmed.strip_prefix("http") {
        format!("ws{rest}")
    } else if trimmed.starts_with("ws") {
        trimmed.to_string()
    } else {
        return Err(ChannelError::InvalidUrl(api_url.to_string()));
    };
    Url::parse(&format!("{ws}/{CHANNEL_PATH}"))
        .map_err(|_| ChannelError::InvalidUrl(api_url.to_string()))
}

pub struct JobChannel {
    url: Url,
    deps: Arc<WorkerDeps>,
    schema: CollectionSchema,
    reconnect_delay: Duration,
    completions_tx: mpsc::UnboundedSender<String>,
    completions_rx: mpsc::UnboundedReceiver<String>,
    unsent: VecDeque<String>,
}

impl JobChannel {
    pub fn new(deps: Arc<WorkerDeps>) -> Result<Self, ChannelError> {
        let url = channel_url(&deps.media.api_url)?;
        let schema = CollectionSchema::frame_index(&deps.worker.collection, deps.worker.dimension);
        let reconnect_delay = deps.worker.reconnect_delay();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Ok(Self {
            url,
            deps,
            schema,
            reconnect_delay,
            completions_tx,
            completions_rx,
            unsent: VecDeque::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connects, serves jobs, and reconnects after every close or error until
    /// `shutdown` fires.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        'connect: loop {
            if shutdown.is_triggered() {
                break;
            }
            match self.session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!(url = %self.url, "job channel closed"),
                Err(err) => warn!(url = %self.url, error = %err, "job channel failed"),
            }
            self.deps.status.set_connected(false);

            info!(
                delay_ms = self.reconnect_delay.as_millis(),
                pending_acks = self.unsent.len(),
                "reconnecting to job channel"
            );
            let reconnect = sleep(self.reconnect_delay);
            tokio::pin!(reconnect);
            loop {
                tokio::select! {
                    _ = &mut reconnect => break,
                    Some(ack) = self.completions_rx.recv() => {
                        debug!(message = %ack, "job finished while disconnected; ack buffered");
                        self.unsent.push_back(ack);
                    }
                    _ = shutdown.wait() => break 'connect,
                }
            }
        }
        self.deps.status.set_connected(false);
        info!("job channel stopped");
    }

    fn request(&self) -> Result<Request, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ChannelError::Connect(Box::new(err)))?;
        let secret = HeaderValue::from_str(&self.deps.media.secret)
            .map_err(|_| ChannelError::InvalidHeader { name: SECRET_HEADER })?;
        let worker_type = HeaderValue::from_str(&self.deps.worker.worker_type).map_err(|_| {
            ChannelError::InvalidHeader {
                name: WORKER_TYPE_HEADER,
            }
        })?;
        let headers = request.headers_mut();
        headers.insert(SECRET_HEADER, secret);
        headers.insert(WORKER_TYPE_HEADER, worker_type);
        Ok(request)
    }

    async fn session(&mut self, shutdown: &mut Shutdown) -> Result<SessionEnd, ChannelError> {
        let request = self.request()?;
        info!(url = %self.url, "connecting to job channel");
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|err| ChannelError::Connect(Box::new(err)))?;
        let (mut sink, mut source) = stream.split();
        info!(url = %self.url, "connected");
        self.deps.status.set_connected(true);

        // An empty frame tells the dispatcher this worker is ready.
        sink.send(Message::Text(String::new()))
            .await
            .map_err(|err| ChannelError::Send(Box::new(err)))?;

        self.prepare_collection().await;

        while let Some(ack) = self.unsent.pop_front() {
            if let Err(err) = sink.send(Message::Text(ack.clone())).await {
                self.unsent.push_front(ack);
                return Err(ChannelError::Send(Box::new(err)));
            }
        }

        loop {
            tokio::select! {
                event = shutdown.wait() => {
                    info!(?event, "closing job channel");
                    if let Err(err) = sink.send(Message::Close(None)).await {
                        debug!(error = %err, "close frame not delivered");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                Some(ack) = self.completions_rx.recv() => {
                    if let Err(err) = sink.send(Message::Text(ack.clone())).await {
                        self.unsent.push_back(ack);
                        return Err(ChannelError::Send(Box::new(err)));
                    }
                    debug!(message = %ack, "job acknowledged");
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.dispatch(text),
                        Err(err) => warn!(error = %err, "ignoring non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "job channel closed by dispatcher");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(ChannelError::Receive(Box::new(err))),
                    None => return Ok(SessionEnd::Closed),
                },
            }
        }
    }

    async fn prepare_collection(&self) {
        let store = match self.deps.connector.connect() {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "store connection failed; collection not prepared");
                return;
            }
        };
        if let Err(err) = ensure_collection(store.as_ref(), &self.schema).await {
            warn!(
                collection = %self.schema.name,
                error = %err,
                "failed to prepare collection"
            );
        }
    }

    fn dispatch(&self, raw: String) {
        if raw.trim().is_empty() {
            debug!("ignoring empty frame");
            return;
        }

        let job = match Job::parse(raw.as_str()) {
            Ok(job) => job,
            Err(err) => {
                warn!(message = %raw, error = %err, "invalid job message; acknowledging without loading");
                self.deps.status.record_rejected();
                let _ = self.completions_tx.send(raw);
                return;
            }
        };

        info!(job = %job, "job received");
        match spawn_unit(job, self.deps.clone()) {
            Ok(unit) => {
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let (job, outcome) = unit.wait().await;
                    debug!(job = %job, loaded = outcome.is_loaded(), "load unit finished");
                    let _ = completions.send(job.raw().to_string());
                });
            }
            Err(err) => {
                error!(message = %raw, error = %err, "could not start load unit; job left unacknowledged");
            }
        }
    }
}
