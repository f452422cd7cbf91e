mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{RecordingStore, SECRET, StoreCall, deps, worker_config};
use futures_util::{SinkExt, StreamExt};
use shotit_loader::config::WorkerConfig;
use shotit_loader::services::JobChannel;
use shotit_loader::shutdown::{self, ShutdownEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

const STEP: Duration = Duration::from_secs(10);

type Session = (WebSocketStream<TcpStream>, HeaderMap);

/// Time a hash download for a file whose name contains `slow` is held open.
const SLOW_DOWNLOAD: Duration = Duration::from_millis(300);

/// Serves WebSocket upgrades to the test and answers every plain HTTP request
/// (hash downloads) with 404.
async fn dispatcher(listener: TcpListener, sessions: mpsc::UnboundedSender<Session>) {
    while let Ok((stream, _)) = listener.accept().await {
        let head = peek_head(&stream).await;
        if head.to_ascii_lowercase().contains("upgrade: websocket") {
            let captured: Arc<Mutex<HeaderMap>> = Arc::default();
            let sink = captured.clone();
            let ws = accept_hdr_async(
                stream,
                move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *sink.lock().expect("header lock") = req.headers().clone();
                    Ok(resp)
                },
            )
            .await
            .expect("websocket handshake");
            let headers = captured.lock().expect("header lock").clone();
            if sessions.send((ws, headers)).is_err() {
                return;
            }
        } else {
            tokio::spawn(respond_not_found(stream));
        }
    }
}

async fn peek_head(stream: &TcpStream) -> String {
    let mut buf = vec![0_u8; 4096];
    loop {
        let n = stream.peek(&mut buf).await.expect("peek request");
        let head = String::from_utf8_lossy(&buf[..n]).to_string();
        if n == 0 || n == buf.len() || head.contains("\r\n\r\n") {
            return head;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn respond_not_found(mut stream: TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0_u8; 1024];
    while !String::from_utf8_lossy(&request).contains("\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    if String::from_utf8_lossy(&request).contains("slow") {
        tokio::time::sleep(SLOW_DOWNLOAD).await;
    }
    let body = "not found";
    let response = format!(
        "HTTP/1.1 404 Not Found\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = timeout(STEP, ws.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("valid frame");
        match frame {
            Message::Text(text) => return text,
            Message::Binary(bytes) => return String::from_utf8(bytes).expect("utf-8 frame"),
            _ => continue,
        }
    }
}

async fn start() -> (
    String,
    mpsc::UnboundedReceiver<Session>,
    Arc<RecordingStore>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(dispatcher(listener, tx));
    (format!("http://{addr}"), rx, RecordingStore::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn acknowledges_jobs_after_readiness_and_collection_setup() {
    let (api_url, mut sessions, store) = start().await;
    let deps = deps(&api_url, &store, worker_config());
    let channel = JobChannel::new(deps.clone()).expect("channel");
    assert!(channel.url().as_str().ends_with("/ws"));

    let (trigger, shutdown) = shutdown::channel();
    let worker = tokio::spawn(channel.run(shutdown));

    let (mut ws, headers) = timeout(STEP, sessions.recv())
        .await
        .expect("connect before timeout")
        .expect("session");
    assert_eq!(headers.get("x-trace-secret").expect("secret header"), SECRET);
    assert_eq!(
        headers.get("x-trace-worker-type").expect("worker type header"),
        "load"
    );
    assert_eq!(next_text(&mut ws).await, "", "readiness frame first");

    // Malformed messages are echoed back without spawning a unit.
    ws.send(Message::Text("not json".to_string()))
        .await
        .expect("send malformed");
    assert_eq!(next_text(&mut ws).await, "not json");

    // A job whose hash download is refused is acknowledged verbatim.
    let job = r#"{"file":"3/missing.mp4"}"#;
    ws.send(Message::Text(job.to_string())).await.expect("send job");
    assert_eq!(next_text(&mut ws).await, job);

    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Has("frames".to_string()),
            StoreCall::Create("frames".to_string()),
        ],
        "only collection setup touched the store"
    );
    let snapshot = deps.status.snapshot();
    assert!(snapshot.connected);
    assert_eq!(snapshot.rejected, 2);

    trigger.trigger(ShutdownEvent::Requested);
    timeout(STEP, worker)
        .await
        .expect("channel stops on shutdown")
        .expect("channel task");
    assert!(!deps.status.snapshot().connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_and_recreates_collection_after_close() {
    let (api_url, mut sessions, store) = start().await;
    let deps = deps(&api_url, &store, worker_config());
    let channel = JobChannel::new(deps.clone()).expect("channel");

    let (trigger, shutdown) = shutdown::channel();
    let worker = tokio::spawn(channel.run(shutdown));

    let (mut first, _) = timeout(STEP, sessions.recv())
        .await
        .expect("first connect")
        .expect("session");
    assert_eq!(next_text(&mut first).await, "");
    first.close(None).await.expect("close first session");

    let (mut second, _) = timeout(STEP, sessions.recv())
        .await
        .expect("reconnect")
        .expect("session");
    assert_eq!(next_text(&mut second).await, "");

    // Wait for the second collection setup to land.
    let mut calls = store.calls();
    for _ in 0..200 {
        if calls.len() >= 6 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        calls = store.calls();
    }
    assert_eq!(
        calls,
        vec![
            StoreCall::Has("frames".to_string()),
            StoreCall::Create("frames".to_string()),
            StoreCall::Has("frames".to_string()),
            StoreCall::Release("frames".to_string()),
            StoreCall::Drop("frames".to_string()),
            StoreCall::Create("frames".to_string()),
        ]
    );

    trigger.trigger(ShutdownEvent::Requested);
    timeout(STEP, worker)
        .await
        .expect("channel stops on shutdown")
        .expect("channel task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ack_finished_while_disconnected_is_sent_after_reconnect() {
    let (api_url, mut sessions, store) = start().await;
    let worker = WorkerConfig {
        reconnect_delay_ms: 900,
        ..worker_config()
    };
    let deps = deps(&api_url, &store, worker);
    let channel = JobChannel::new(deps.clone()).expect("channel");

    let (trigger, shutdown) = shutdown::channel();
    let handle = tokio::spawn(channel.run(shutdown));

    let (mut first, _) = timeout(STEP, sessions.recv())
        .await
        .expect("first connect")
        .expect("session");
    assert_eq!(next_text(&mut first).await, "");

    // The unit is still downloading when the dispatcher drops the session.
    let job = r#"{"file":"8/slow episode.mp4"}"#;
    first
        .send(Message::Text(job.to_string()))
        .await
        .expect("send job");
    first.close(None).await.expect("close first session");
    drop(first);

    let (mut second, _) = timeout(STEP, sessions.recv())
        .await
        .expect("reconnect")
        .expect("session");
    assert_eq!(next_text(&mut second).await, "", "readiness frame first");
    assert_eq!(next_text(&mut second).await, job, "buffered ack replayed verbatim");

    let snapshot = deps.status.snapshot();
    assert_eq!(snapshot.rejected, 1);
    assert_eq!(snapshot.in_flight, 0);

    // Nothing else is queued for the new session.
    assert!(
        timeout(Duration::from_millis(200), second.next()).await.is_err(),
        "ack delivered exactly once"
    );

    trigger.trigger(ShutdownEvent::Requested);
    timeout(STEP, handle)
        .await
        .expect("channel stops on shutdown")
        .expect("channel task");
}
