pub mod client;
pub mod events;

pub use client::TranscriptStream;
pub use events::{ConnectionState, StreamEvent};
