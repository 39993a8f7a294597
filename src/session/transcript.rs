use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of transcribed text received from the service.
///
/// Immutable once appended; arrival order is the entry's position in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Transcribed text
    pub text: String,

    /// When this fragment was received
    pub received_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Append-only, ordered log of transcript fragments.
///
/// Entries are never removed or reordered. Appends happen on the single
/// controller task, so no synchronization is needed here.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry at the end of the log.
    pub fn append(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// The full ordered sequence, oldest first.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
