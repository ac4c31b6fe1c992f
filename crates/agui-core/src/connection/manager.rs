//! ConnectionManager - lifecycle of the streaming channel and the HTTP fallback.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::dispatch::dispatch_frame;
use super::fallback::FallbackTransport;
use super::ConnectionState;
use crate::config::{SessionConfig, HEALTH_PATH};
use crate::error::SessionError;
use crate::event_bus::EventBus;
use crate::events::SessionEvent;
use crate::logging::{log_frame, Direction, LogHandle};
use crate::protocol::{InboundEnvelope, OutboundEnvelope};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `shutdown` waits for the close frame to be flushed.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// How an outbound envelope left the process.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Written to the channel; any reply arrives later on the event bus.
    Streamed,
    /// Sent over the fallback. The reply is returned here and not published.
    Fallback(Option<InboundEnvelope>),
}

struct Status {
    state: ConnectionState,
    /// Bumped on every connect attempt and on shutdown, so tasks of an older
    /// connection cannot change the state of a newer one.
    generation: u64,
}

/// Everything that must be released when a channel goes away.
struct Link {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Shared pieces the reader task needs after `connect` returns.
#[derive(Clone)]
struct Shared {
    status: Arc<Mutex<Status>>,
    /// Held across a state change and its publication, so every consumer
    /// sees transitions in the order they were applied.
    transitions: Arc<Mutex<()>>,
    event_bus: Arc<EventBus>,
    transcript: LogHandle,
}

impl Shared {
    fn publish_state(&self, state: ConnectionState) {
        self.event_bus
            .publish(SessionEvent::Connection { status: state });
    }

    /// Move to `Disconnected` if `generation` is still current.
    fn mark_disconnected(&self, generation: u64) {
        let _transition = self.transitions.lock().unwrap();
        let changed = {
            let mut status = self.status.lock().unwrap();
            if status.generation == generation && status.state != ConnectionState::Disconnected {
                status.state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        };
        if changed {
            log::info!("Channel disconnected");
            self.publish_state(ConnectionState::Disconnected);
        }
    }
}

/// Resets a pending attempt to `Disconnected` unless disarmed, including when
/// the `connect` future is dropped mid-handshake.
struct AttemptGuard<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl AttemptGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.mark_disconnected(self.generation);
        }
    }
}

/// Owns at most one streaming channel at a time.
pub struct ConnectionManager {
    config: SessionConfig,
    shared: Shared,
    fallback: Arc<dyn FallbackTransport>,
    link: Mutex<Option<Link>>,
}

impl ConnectionManager {
    pub fn new(
        config: SessionConfig,
        event_bus: Arc<EventBus>,
        fallback: Arc<dyn FallbackTransport>,
        transcript: LogHandle,
    ) -> Self {
        Self {
            config,
            shared: Shared {
                status: Arc::new(Mutex::new(Status {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                })),
                transitions: Arc::new(Mutex::new(())),
                event_bus,
                transcript,
            },
            fallback,
            link: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.lock().unwrap().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the streaming channel and wait until it is ready.
    ///
    /// Fails with `AlreadyConnecting` while another attempt is pending. A
    /// no-op when already connected.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let url = self.config.socket_url()?;

        let generation = {
            let _transition = self.shared.transitions.lock().unwrap();
            let generation = {
                let mut status = self.shared.status.lock().unwrap();
                match status.state {
                    ConnectionState::Connecting => return Err(SessionError::AlreadyConnecting),
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected => {}
                }
                status.state = ConnectionState::Connecting;
                status.generation += 1;
                status.generation
            };
            self.shared.publish_state(ConnectionState::Connecting);
            generation
        };
        let guard = AttemptGuard {
            shared: &self.shared,
            generation,
            armed: true,
        };

        log::info!("Connecting to {}", url);
        let ws = match tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                log::warn!("Connection to {} failed: {}", url, e);
                return Err(SessionError::Connection(e.to_string()));
            }
            Err(_) => {
                log::warn!("Connection to {} timed out", url);
                return Err(SessionError::Connection(format!(
                    "timed out after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (sink, stream) = ws.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();
        let link = Link {
            outbound,
            writer: tokio::spawn(write_loop(sink, outbound_rx)),
            reader: tokio::spawn(read_loop(stream, self.shared.clone(), generation, start_rx)),
        };

        {
            let _transition = self.shared.transitions.lock().unwrap();
            {
                let mut status = self.shared.status.lock().unwrap();
                if status.generation != generation {
                    // shutdown() ran while the handshake was in flight
                    drop(status);
                    drop(link);
                    guard.disarm();
                    return Err(SessionError::Connection(
                        "connection shut down while connecting".to_string(),
                    ));
                }
                status.state = ConnectionState::Connected;
            }
            // Replacing a stale link aborts its tasks.
            *self.link.lock().unwrap() = Some(link);
            guard.disarm();
            log::info!("Connected to {}", url);
            self.shared.publish_state(ConnectionState::Connected);
        }

        // Frames are only dispatched after `connected` has been published.
        let _ = start_tx.send(());
        Ok(())
    }

    /// Send an envelope over the channel, or over the fallback when the
    /// channel is not open.
    pub async fn send(&self, envelope: &OutboundEnvelope) -> Result<SendOutcome, SessionError> {
        let payload =
            serde_json::to_string(envelope).map_err(|e| SessionError::Protocol(e.to_string()))?;

        if self.is_connected() {
            if self.try_stream(&payload) {
                return Ok(SendOutcome::Streamed);
            }
            log::warn!("Channel writer is gone, using fallback");
        }

        self.send_fallback(envelope).await
    }

    fn try_stream(&self, payload: &str) -> bool {
        let link = self.link.lock().unwrap();
        let Some(link) = link.as_ref() else {
            return false;
        };
        if link
            .outbound
            .send(Message::Text(payload.to_string().into()))
            .is_err()
        {
            return false;
        }
        log_frame(&self.shared.transcript, Direction::Send, payload);
        true
    }

    async fn send_fallback(
        &self,
        envelope: &OutboundEnvelope,
    ) -> Result<SendOutcome, SessionError> {
        if !self.config.fallback_enabled {
            return Err(SessionError::NotConnected(
                "channel is closed and fallback is disabled".to_string(),
            ));
        }

        let path = envelope.fallback_path();
        let body =
            serde_json::to_value(envelope).map_err(|e| SessionError::Protocol(e.to_string()))?;
        log_frame(&self.shared.transcript, Direction::Fallback, &body.to_string());
        log::debug!("Channel closed, sending via fallback {}", path);

        let fallback = Arc::clone(&self.fallback);
        let reply = tokio::task::spawn_blocking(move || fallback.post(path, &body))
            .await
            .map_err(|e| SessionError::NotConnected(format!("fallback task failed: {}", e)))??;

        let Some(value) = reply else {
            return Ok(SendOutcome::Fallback(None));
        };
        log_frame(
            &self.shared.transcript,
            Direction::FallbackReply,
            &value.to_string(),
        );
        let envelope = serde_json::from_value::<InboundEnvelope>(value)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        Ok(SendOutcome::Fallback(Some(envelope)))
    }

    /// Liveness probe against the backend's health endpoint.
    pub async fn probe_health(&self) -> bool {
        let fallback = Arc::clone(&self.fallback);
        match tokio::task::spawn_blocking(move || fallback.get(HEALTH_PATH)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::warn!("Health probe failed: {}", e);
                false
            }
            Err(e) => {
                log::warn!("Health probe task failed: {}", e);
                false
            }
        }
    }

    /// Close the channel. Safe to call in any state, any number of times.
    pub async fn shutdown(&self) {
        let link = {
            let _transition = self.shared.transitions.lock().unwrap();
            let link = self.link.lock().unwrap().take();
            let previous = {
                let mut status = self.shared.status.lock().unwrap();
                status.generation += 1;
                std::mem::replace(&mut status.state, ConnectionState::Disconnected)
            };
            if previous != ConnectionState::Disconnected {
                log::info!("Channel shut down");
                self.shared.publish_state(ConnectionState::Disconnected);
            }
            link
        };

        if let Some(mut link) = link {
            let _ = link.outbound.send(Message::Close(None));
            if tokio::time::timeout(CLOSE_GRACE, &mut link.writer)
                .await
                .is_err()
            {
                log::debug!("Close frame not flushed within {:?}", CLOSE_GRACE);
            }
            // dropping the link aborts whatever is still running
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            log::warn!("Channel write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    shared: Shared,
    generation: u64,
    start: oneshot::Receiver<()>,
) {
    if start.await.is_err() {
        return;
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatch_frame(&shared.event_bus, &shared.transcript, text.as_str());
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch_frame(&shared.event_bus, &shared.transcript, text),
                Err(_) => {
                    log::warn!("Dropping non UTF-8 binary frame ({} bytes)", bytes.len());
                    shared.event_bus.publish(SessionEvent::Error(
                        crate::events::ProtocolError {
                            message: "binary frame is not valid UTF-8".to_string(),
                            frame: String::new(),
                        },
                    ));
                }
            },
            Ok(Message::Close(frame)) => {
                log::debug!("Channel closed by peer: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Channel read failed: {}", e);
                break;
            }
        }
    }

    shared.mark_disconnected(generation);
}
