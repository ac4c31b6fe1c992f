//! Shared helpers for integration tests: a scripted WebSocket backend and an
//! in-memory fallback transport.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use agui_core::connection::FallbackTransport;
use agui_core::error::FallbackError;
use agui_core::{ChatSession, SessionConfig, SessionEvent};

pub const TIMEOUT: Duration = Duration::from_secs(5);

enum Script {
    Send(String),
    SendBinary(Vec<u8>),
    Close,
}

type Scripts = Arc<Mutex<Vec<mpsc::UnboundedSender<Script>>>>;

/// Backend that accepts WebSocket clients on one address.
///
/// Frames any client sends are collected in arrival order. Frames queued with
/// [`MockBackend::send`] go to the most recent connection.
pub struct MockBackend {
    pub base_url: String,
    frames: mpsc::UnboundedReceiver<String>,
    scripts: Scripts,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::with_handshake_delay(Duration::ZERO).await
    }

    /// Hold each TCP connection for `delay` before answering the upgrade.
    pub async fn with_handshake_delay(delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let scripts: Scripts = Arc::new(Mutex::new(Vec::new()));

        let registered = Arc::clone(&scripts);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (script, script_rx) = mpsc::unbounded_channel();
                registered.lock().unwrap().push(script);
                tokio::spawn(serve_connection(stream, delay, frames_tx.clone(), script_rx));
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            frames,
            scripts,
        }
    }

    fn script(&self, index: Option<usize>, command: Script) {
        let scripts = self.scripts.lock().unwrap();
        let target = match index {
            Some(index) => scripts.get(index),
            None => scripts.last(),
        };
        if let Some(target) = target {
            let _ = target.send(command);
        }
    }

    pub fn send(&self, frame: impl Into<String>) {
        self.script(None, Script::Send(frame.into()));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        self.script(None, Script::SendBinary(bytes));
    }

    pub fn close(&self) {
        self.script(None, Script::Close);
    }

    /// Close the `index`-th accepted connection (0 is the first).
    pub fn close_connection(&self, index: usize) {
        self.script(Some(index), Script::Close);
    }

    pub fn connection_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    /// Next frame received from the client, parsed as JSON.
    pub async fn next_frame(&mut self) -> Value {
        let text = timeout(TIMEOUT, self.frames.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("backend stopped");
        serde_json::from_str(&text).unwrap()
    }
}

async fn serve_connection(
    stream: TcpStream,
    delay: Duration,
    frames_tx: mpsc::UnboundedSender<String>,
    mut script_rx: mpsc::UnboundedReceiver<Script>,
) {
    tokio::time::sleep(delay).await;
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            command = script_rx.recv() => match command {
                Some(Script::Send(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Script::SendBinary(bytes)) => {
                    if sink.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                Some(Script::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = frames_tx.send(text.to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Fallback transport that records requests and answers from a script.
#[derive(Default)]
pub struct ScriptedFallback {
    pub requests: Mutex<Vec<(String, Value)>>,
    pub reply: Mutex<Option<Value>>,
}

impl ScriptedFallback {
    /// Accepts every request with an empty reply body.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replying(reply: Value) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            reply: Mutex::new(Some(reply)),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl FallbackTransport for ScriptedFallback {
    fn post(&self, path: &str, body: &Value) -> Result<Option<Value>, FallbackError> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        Ok(self.reply.lock().unwrap().clone())
    }

    fn get(&self, _path: &str) -> Result<(), FallbackError> {
        Ok(())
    }
}

pub fn session_for(backend: &MockBackend, fallback: Arc<ScriptedFallback>) -> ChatSession {
    ChatSession::builder()
        .config(SessionConfig::new(backend.base_url.clone()))
        .fallback(fallback)
        .build()
}

/// Wait for the first tapped event matching `pred`.
pub async fn wait_for<F>(tap: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            let event = tap.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
