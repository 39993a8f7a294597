use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::transcript::{TranscriptEntry, TranscriptLog};
use crate::audio::{write_wav, ArchiveConfig, AudioChunk, CaptureBackend, ChunkAssembler};
use crate::stream::{ConnectionState, StreamEvent, TranscriptStream};

/// Controller state: one capture-to-send cycle at a time, cycling forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

/// One start-to-stop recording cycle.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub chunks_received: usize,
}

impl RecordingSession {
    fn begin() -> Self {
        Self {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            started_at: Utc::now(),
            chunks_received: 0,
        }
    }
}

/// User-facing control commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    SetEndpoint(String),
    Shutdown,
}

impl Command {
    /// Parse a line-oriented command: `start`, `stop`, `endpoint <url>`,
    /// `quit`/`exit`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "endpoint" if !rest.is_empty() => Some(Command::SetEndpoint(rest.to_string())),
            "quit" | "exit" => Some(Command::Shutdown),
            _ => None,
        }
    }
}

enum Tick {
    Command(Option<Command>),
    Event(Option<StreamEvent>),
    Chunk(Option<AudioChunk>),
}

/// State machine coordinating capture, assembly, and the transcript stream.
///
/// The only component with cross-cutting knowledge of all three. All of its
/// inputs (commands, chunk delivery, stream events) are handled on the one
/// task driving `run()`, so handlers never race each other.
pub struct SessionController {
    state: SessionState,
    capture: Box<dyn CaptureBackend>,
    assembler: ChunkAssembler,
    stream: TranscriptStream,
    log: TranscriptLog,
    session: Option<RecordingSession>,
    chunk_rx: Option<mpsc::Receiver<AudioChunk>>,
    events: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    archive: Option<ArchiveConfig>,
}

impl SessionController {
    /// Build a controller and open the stream's first connection.
    pub fn new(
        capture: Box<dyn CaptureBackend>,
        mut stream: TranscriptStream,
        archive: Option<ArchiveConfig>,
    ) -> Self {
        let events = stream.connect();

        Self {
            state: SessionState::Idle,
            capture,
            assembler: ChunkAssembler::new(),
            stream,
            log: TranscriptLog::new(),
            session: None,
            chunk_rx: None,
            events: Some(events),
            archive,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.log
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn endpoint(&self) -> &str {
        self.stream.endpoint()
    }

    /// Begin a new recording session.
    ///
    /// Re-entrant start is a logged no-op: the running session continues and
    /// the capture backend is not started a second time. A device failure
    /// leaves the controller `Idle`; there is no automatic retry.
    pub async fn start_recording(&mut self) -> Result<()> {
        if self.state == SessionState::Recording {
            warn!("start requested but recording is already in progress");
            return Ok(());
        }

        let chunk_rx = self
            .capture
            .start()
            .await
            .context("failed to start audio capture")?;

        let session = RecordingSession::begin();
        info!(
            "recording started: {} (backend: {})",
            session.id,
            self.capture.name()
        );

        self.chunk_rx = Some(chunk_rx);
        self.session = Some(session);
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Stop the active session, assemble its payload, and hand it to the
    /// stream. A stop without an active recording is a logged no-op.
    pub async fn stop_recording(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            warn!("stop requested but no recording in progress");
            return Ok(());
        }

        self.capture
            .stop()
            .await
            .context("failed to stop audio capture")?;

        // Chunks already in flight at stop time are accepted: drain until
        // the capture channel closes, which marks the final chunk delivered.
        if let Some(mut chunk_rx) = self.chunk_rx.take() {
            while let Some(chunk) = chunk_rx.recv().await {
                self.ingest_chunk(chunk);
            }
        }

        self.finalize_session();
        Ok(())
    }

    /// Point the stream at a new endpoint; the old connection is torn down
    /// and its remaining events are never observed.
    pub fn set_endpoint(&mut self, endpoint: String) {
        info!("switching endpoint to {}", endpoint);
        self.events = Some(self.stream.set_endpoint(endpoint));
    }

    /// Receive and handle the next stream event. Returns false once the
    /// event channel is gone. Useful when embedding the controller without
    /// `run()`.
    pub async fn poll_event(&mut self) -> bool {
        let event = match &mut self.events {
            Some(events) => events.recv().await,
            None => return false,
        };

        match event {
            Some(event) => {
                self.handle_stream_event(event);
                true
            }
            None => {
                self.events = None;
                false
            }
        }
    }

    /// Drive the controller until `Shutdown` (or the command channel
    /// closes). This loop is the single event-processing context: commands,
    /// chunk delivery, and stream events are all handled here, one at a
    /// time.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        info!("session controller running against {}", self.endpoint());

        loop {
            let tick = tokio::select! {
                command = commands.recv() => Tick::Command(command),
                event = next_event(&mut self.events) => Tick::Event(event),
                chunk = next_chunk(&mut self.chunk_rx) => Tick::Chunk(chunk),
            };

            match tick {
                Tick::Command(None) | Tick::Command(Some(Command::Shutdown)) => break,
                Tick::Command(Some(Command::Start)) => {
                    if let Err(e) = self.start_recording().await {
                        error!("unable to start recording: {:#}", e);
                    }
                }
                Tick::Command(Some(Command::Stop)) => {
                    if let Err(e) = self.stop_recording().await {
                        error!("unable to stop recording: {:#}", e);
                    }
                }
                Tick::Command(Some(Command::SetEndpoint(endpoint))) => {
                    self.set_endpoint(endpoint);
                }
                Tick::Event(Some(event)) => self.handle_stream_event(event),
                Tick::Event(None) => {
                    warn!("stream event channel closed");
                    self.events = None;
                }
                Tick::Chunk(Some(chunk)) => self.ingest_chunk(chunk),
                Tick::Chunk(None) => {
                    // Capture ended without a stop (device error); finish
                    // the session best-effort, as a stop would. The backend
                    // still needs its stop so a later start can succeed.
                    warn!("capture ended unexpectedly, finishing session");
                    if let Err(e) = self.capture.stop().await {
                        warn!("failed to reset capture backend: {:#}", e);
                    }
                    self.finalize_session();
                }
            }
        }

        if self.state == SessionState::Recording {
            if let Err(e) = self.stop_recording().await {
                error!("unable to stop recording on shutdown: {:#}", e);
            }
        }
        self.stream.close();

        info!("session controller stopped");
        Ok(())
    }

    fn ingest_chunk(&mut self, chunk: AudioChunk) {
        if let Some(session) = &mut self.session {
            session.chunks_received += 1;
        }
        self.assembler.append(chunk);
    }

    fn finalize_session(&mut self) {
        let session = self.session.take();
        let payload = self.assembler.finish();
        self.state = SessionState::Idle;
        self.chunk_rx = None;

        if let Some(session) = &session {
            let elapsed = Utc::now().signed_duration_since(session.started_at);
            info!(
                "session {} complete: {} chunks, {} bytes in {:.1}s",
                session.id,
                session.chunks_received,
                payload.len(),
                elapsed.num_milliseconds() as f64 / 1000.0
            );

            if let Some(archive) = &self.archive {
                match write_wav(archive, &session.id, &payload) {
                    Ok(path) => info!("session archived to {}", path.display()),
                    Err(e) => warn!("failed to archive session: {:#}", e),
                }
            }
        }

        self.stream.send(payload);
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Opened => {
                info!("transcription service connected ({})", self.stream.endpoint());
            }
            StreamEvent::Failed(reason) => {
                error!("connection failed: {}", reason);
            }
            StreamEvent::Fragment(text) => {
                println!("{}", text);
                self.log.append(TranscriptEntry::new(text));
            }
            StreamEvent::TransportError(reason) => {
                error!("transport error: {}", reason);
            }
            StreamEvent::Closed { code, reason } => {
                warn!("connection closed (code: {:?}, reason: {:?})", code, reason);
            }
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<StreamEvent>>,
) -> Option<StreamEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_chunk(chunk_rx: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match chunk_rx {
        Some(chunk_rx) => chunk_rx.recv().await,
        None => std::future::pending().await,
    }
}
