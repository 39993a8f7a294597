use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub stream: StreamSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// WebSocket address of the transcription service
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_ms: u64,
    /// When set, each finished session payload is also written here as WAV
    pub archive_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "voicewire".to_string(),
            },
            stream: StreamSettings {
                endpoint: "ws://127.0.0.1:3000/audio".to_string(),
            },
            audio: AudioSettings {
                sample_rate: 16000,
                channels: 1,
                chunk_duration_ms: 100,
                archive_dir: None,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
