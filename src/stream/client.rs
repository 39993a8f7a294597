use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{ConnectionState, StreamEvent};
use crate::audio::AudioPayload;

/// Persistent WebSocket connection to the remote transcription service.
///
/// Outbound: one completed session payload per binary message. Inbound: each
/// text message is one transcript fragment, surfaced as one `StreamEvent`
/// in arrival order.
///
/// There is no reconnect, no send queue while disconnected, and no retry:
/// `send` while the connection is not open is a logged no-op, and a dropped
/// connection stays dropped until the caller connects again.
pub struct TranscriptStream {
    endpoint: String,
    state: Arc<Mutex<ConnectionState>>,
    /// Bumped on every connect/close; tasks from a superseded connection
    /// stop surfacing events once their generation is stale.
    generation: Arc<AtomicU64>,
    outbound: Option<mpsc::UnboundedSender<AudioPayload>>,
}

impl TranscriptStream {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Arc::new(Mutex::new(ConnectionState::Closed)),
            generation: Arc::new(AtomicU64::new(0)),
            outbound: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(_) => ConnectionState::Failed,
        }
    }

    /// Open a connection to the current endpoint.
    ///
    /// Non-blocking: establishment runs on a spawned task, and the caller
    /// observes `Opened`, `Failed`, fragments, and the eventual `Closed`
    /// through the returned receiver. Any previous connection is superseded.
    pub fn connect(&mut self) -> mpsc::UnboundedReceiver<StreamEvent> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        set_state(&self.state, ConnectionState::Connecting);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.outbound = Some(out_tx);

        info!("connecting to {}", self.endpoint);

        tokio::spawn(run_connection(
            self.endpoint.clone(),
            generation,
            Arc::clone(&self.generation),
            Arc::clone(&self.state),
            event_tx,
            out_rx,
        ));

        event_rx
    }

    /// Transmit one payload as a single binary message.
    ///
    /// Only valid while the connection is open; otherwise the payload is
    /// dropped silently. Intentional no-op, not an error.
    pub fn send(&self, payload: AudioPayload) {
        if self.state() != ConnectionState::Open {
            debug!(
                "dropping {} byte payload, connection not open",
                payload.len()
            );
            return;
        }

        if let Some(outbound) = &self.outbound {
            if outbound.send(payload).is_err() {
                debug!("dropping payload, connection task already gone");
            }
        }
    }

    /// Tear down the current connection. In-flight sends are abandoned.
    pub fn close(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender makes the writer task send a close frame
        self.outbound = None;
        set_state(&self.state, ConnectionState::Closed);
        info!("connection to {} closed", self.endpoint);
    }

    /// Replace the endpoint: the old connection is torn down wholesale and a
    /// fresh one is opened against the new address. No events from the old
    /// connection arrive after the switch.
    pub fn set_endpoint(
        &mut self,
        endpoint: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        self.close();
        self.endpoint = endpoint.into();
        self.connect()
    }
}

fn set_state(state: &Mutex<ConnectionState>, next: ConnectionState) {
    if let Ok(mut guard) = state.lock() {
        *guard = next;
    }
}

async fn run_connection(
    endpoint: String,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    state: Arc<Mutex<ConnectionState>>,
    events: mpsc::UnboundedSender<StreamEvent>,
    mut outbound: mpsc::UnboundedReceiver<AudioPayload>,
) {
    let is_current = || current_generation.load(Ordering::SeqCst) == generation;

    if let Err(e) = Url::parse(&endpoint) {
        if is_current() {
            set_state(&state, ConnectionState::Failed);
            let _ = events.send(StreamEvent::Failed(format!("invalid endpoint: {}", e)));
        }
        return;
    }

    let ws = match connect_async(endpoint.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            error!("failed to connect to {}: {}", endpoint, e);
            if is_current() {
                set_state(&state, ConnectionState::Failed);
                let _ = events.send(StreamEvent::Failed(e.to_string()));
            }
            return;
        }
    };

    if !is_current() {
        // Superseded while the handshake was in flight
        return;
    }

    info!("connected to {}", endpoint);
    set_state(&state, ConnectionState::Open);
    let _ = events.send(StreamEvent::Opened);

    let (mut sink, mut read) = ws.split();

    // Writer: forwards payloads until the stream drops its sender, then
    // initiates a clean close.
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            debug!("sending {} byte payload", payload.len());
            if sink.send(Message::Binary(payload)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut close_code: Option<u16> = None;
    let mut close_reason = String::new();

    while let Some(item) = read.next().await {
        match item {
            Ok(Message::Text(text)) => {
                if is_current() {
                    let _ = events.send(StreamEvent::Fragment(text));
                }
            }
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    close_code = Some(u16::from(frame.code));
                    close_reason = frame.reason.to_string();
                }
            }
            Ok(_) => {
                // The service speaks text inbound; binary/ping/pong ignored
            }
            Err(e) => {
                // Two-signal contract: an error event never implies Closed.
                // The read loop ending emits the close separately below.
                warn!("transport error on {}: {}", endpoint, e);
                if is_current() {
                    let _ = events.send(StreamEvent::TransportError(e.to_string()));
                }
            }
        }
    }

    writer.abort();

    if is_current() {
        info!("connection to {} closed by transport", endpoint);
        set_state(&state, ConnectionState::Closed);
        let _ = events.send(StreamEvent::Closed {
            code: close_code,
            reason: close_reason,
        });
    }
}
