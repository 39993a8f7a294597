/// Lifecycle of the connection to the transcription service.
///
/// Owned by `TranscriptStream`; `send` is only permitted while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Events surfaced by `TranscriptStream`.
///
/// A transport error and the connection closing are two separate signals:
/// `TransportError` never implies `Closed`; the close always arrives as its
/// own event when the read loop ends.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connection established
    Opened,
    /// Connection establishment failed
    Failed(String),
    /// One inbound text message from the service (one message = one entry)
    Fragment(String),
    /// Transport-level error; the connection may still emit `Closed` after
    TransportError(String),
    /// Connection closed (by either side)
    Closed {
        code: Option<u16>,
        reason: String,
    },
}
