use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voicewire::{
    ArchiveConfig, CaptureBackendFactory, CaptureConfig, CaptureSource, Command, Config,
    SessionController, TranscriptStream,
};

#[derive(Parser)]
#[command(name = "voicewire")]
#[command(about = "Stream microphone audio to a transcription service")]
struct Args {
    /// Path to a TOML config file (defaults to built-in settings)
    #[arg(short, long)]
    config: Option<String>,

    /// Transcription service endpoint (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(endpoint) = args.endpoint {
        cfg.stream.endpoint = endpoint;
    }

    info!("{} starting", cfg.service.name);
    info!("transcription endpoint: {}", cfg.stream.endpoint);

    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        chunk_duration_ms: cfg.audio.chunk_duration_ms,
    };
    let capture = CaptureBackendFactory::create(CaptureSource::Microphone, capture_config)?;

    let archive = cfg
        .audio
        .archive_dir
        .as_ref()
        .map(|dir| ArchiveConfig::new(dir, cfg.audio.sample_rate, cfg.audio.channels));

    let stream = TranscriptStream::new(cfg.stream.endpoint.clone());
    let mut controller = SessionController::new(capture, stream, archive);

    let (command_tx, command_rx) = mpsc::channel(16);
    tokio::spawn(read_commands(command_tx));

    controller.run(command_rx).await
}

/// Read line-oriented commands from stdin and forward them to the
/// controller. Stdin closing shuts the controller down.
async fn read_commands(commands: mpsc::Sender<Command>) {
    println!("commands: start | stop | endpoint <url> | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::parse(&line) {
            Some(command) => command,
            None => {
                warn!("unrecognized command: {}", line.trim());
                continue;
            }
        };

        let shutdown = command == Command::Shutdown;
        if commands.send(command).await.is_err() || shutdown {
            return;
        }
    }

    let _ = commands.send(Command::Shutdown).await;
}
