use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use super::capture::{AudioChunk, CaptureBackend};

/// Capture backend that replays a preset chunk sequence (for testing and
/// batch processing).
///
/// `start()` queues every chunk into the delivery channel immediately, in
/// order; the channel stays open until `stop()`, after which the remaining
/// chunks drain and the channel closes, matching the live backend's
/// completion signal.
pub struct ScriptedCapture {
    chunks: Vec<AudioChunk>,
    starts: Arc<AtomicUsize>,
    tx: Option<mpsc::Sender<AudioChunk>>,
    capturing: bool,
}

impl ScriptedCapture {
    pub fn new(chunks: Vec<AudioChunk>) -> Self {
        Self {
            chunks,
            starts: Arc::new(AtomicUsize::new(0)),
            tx: None,
            capturing: false,
        }
    }

    /// Build a scripted backend from raw chunk byte buffers.
    pub fn from_bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self::new(chunks.into_iter().map(AudioChunk::new).collect())
    }

    /// Handle counting how many times `start()` has been invoked.
    pub fn start_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.starts)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.capturing {
            anyhow::bail!("capture already running");
        }

        self.starts.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.chunks.len() + 1);
        for chunk in &self.chunks {
            // Capacity covers the whole script, so this never blocks
            tx.try_send(chunk.clone())?;
        }

        info!("scripted capture started ({} chunks queued)", self.chunks.len());

        self.tx = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        // Dropping the sender closes the channel once queued chunks drain
        self.tx = None;
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
