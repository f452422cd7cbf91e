//! Health endpoint.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::services::{StatusSnapshot, WorkerStatus};
use crate::shutdown::{Shutdown, ShutdownEvent};

const HEALTHZ_PATH: &str = "/v1/healthz";
const HEALTHZ_STATUS: &str = "ok";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
struct HealthzResponse {
    status: &'static str,
    worker: StatusSnapshot,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listen address may not be empty")]
    EmptyListenAddr,
    #[error("invalid listen address `{address}`: {source}")]
    InvalidListenAddr {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to determine local address: {source}")]
    LocalAddr {
        #[source]
        source: std::io::Error,
    },
    #[error("axum server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

pub fn build_api_router(status: Arc<WorkerStatus>) -> Router {
    debug_assert!(HEALTHZ_PATH.starts_with("/v1/"));
    debug_assert!(HEALTHZ_PATH.ends_with("healthz"));

    Router::new()
        .route(HEALTHZ_PATH, get(healthz))
        .with_state(status)
}

pub async fn serve(
    config: ServerConfig,
    status: Arc<WorkerStatus>,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    debug_assert!(config.listen_addr.len() <= 128);

    let listen_addr = parse_listen_addr(&config.listen_addr)?;
    let listener = bind_listener(listen_addr).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::LocalAddr { source })?;
    tracing::info!(%local_addr, "health endpoint listening");

    let app = build_api_router(status);
    let mut server_future = Box::pin({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for(shutdown))
                .await
        }
    });
    let mut drain_timeout = Box::pin(drain_timeout_future(shutdown));

    tokio::select! {
        result = server_future.as_mut() => {
            if let Err(source) = result {
                return Err(ServerError::Serve { source });
            }
        }
        _ = drain_timeout.as_mut() => {
            // Timeout elapsed; dropping the server future forces termination.
        }
    }

    tracing::info!("health endpoint stopped");
    Ok(())
}

async fn healthz(State(status): State<Arc<WorkerStatus>>) -> impl IntoResponse {
    debug_assert_eq!(HEALTHZ_STATUS, "ok");

    Json(HealthzResponse {
        status: HEALTHZ_STATUS,
        worker: status.snapshot(),
    })
}

fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    debug_assert!(!addr.contains('\n'));

    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(ServerError::EmptyListenAddr);
    }

    trimmed
        .parse()
        .map_err(|source| ServerError::InvalidListenAddr {
            address: trimmed.to_string(),
            source,
        })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            address: addr.to_string(),
            source,
        })
}

fn wait_for(mut shutdown: Shutdown) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let event = shutdown.wait().await;
        debug_assert!(event != ShutdownEvent::Pending);
    }
}

fn drain_timeout_future(mut shutdown: Shutdown) -> impl Future<Output = ()> + Send + 'static {
    debug_assert!(DRAIN_TIMEOUT.as_secs() >= 1);
    async move {
        let event = shutdown.wait().await;
        tracing::info!(?event, "draining health endpoint connections");
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        tracing::warn!(
            ?event,
            seconds = DRAIN_TIMEOUT.as_secs(),
            "graceful shutdown timed out; continuing shutdown"
        );
    }
}
