use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::capture::{AudioChunk, CaptureBackend, CaptureConfig};

/// Microphone capture backend built on cpal.
///
/// The cpal stream is not `Send`, so the device is owned by a dedicated
/// capture thread. The audio callback converts incoming samples to mono
/// s16le PCM at the target rate; the thread flushes the accumulated bytes
/// as one chunk per configured interval.
///
/// `stop()` raises a flag; the thread drops the stream (releasing the
/// device), flushes the residual samples as a final chunk, and closes the
/// chunk channel. Channel close is the session-complete signal.
pub struct MicCapture {
    config: CaptureConfig,
    stop_flag: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.capturing {
            anyhow::bail!("capture already running");
        }

        self.stop_flag.store(false, Ordering::Release);

        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        let config = self.config.clone();
        let stop = Arc::clone(&self.stop_flag);

        let worker = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || capture_loop(config, stop, chunk_tx, ready_tx))
            .context("failed to spawn capture thread")?;

        // Wait for the thread to open the device so an unavailable
        // microphone surfaces here instead of as a silent dead channel.
        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                self.capturing = true;
                Ok(chunk_rx)
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e.context("microphone unavailable"))
            }
            Err(_) => {
                let _ = worker.join();
                anyhow::bail!("capture thread exited before opening the device")
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        self.stop_flag.store(true, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            // The thread finishes on its own after flushing the tail chunk;
            // join it off the async runtime.
            let _ = tokio::task::spawn_blocking(move || {
                let _ = worker.join();
            });
        }

        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Accumulates converted samples from the audio callback.
#[derive(Clone)]
struct SampleTap {
    state: Arc<Mutex<TapState>>,
    source_channels: u16,
    /// Take every Nth mono sample (integer decimation to the target rate)
    decimate: u32,
}

struct TapState {
    bytes: Vec<u8>,
    phase: u32,
}

impl SampleTap {
    fn new(source_channels: u16, decimate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(TapState {
                bytes: Vec::new(),
                phase: 0,
            })),
            source_channels,
            decimate: decimate.max(1),
        }
    }

    fn ingest<T>(&self, data: &[T])
    where
        T: cpal::Sample + cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        if let Ok(mut state) = self.state.lock() {
            let channels = self.source_channels.max(1) as usize;
            for frame in data.chunks(channels) {
                // Average interleaved channels down to mono
                let mut acc = 0.0f32;
                for &sample in frame {
                    let value: f32 = cpal::Sample::from_sample(sample);
                    acc += value;
                }
                let mono = acc / frame.len() as f32;

                if state.phase == 0 {
                    let value = (mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    state.bytes.extend_from_slice(&value.to_le_bytes());
                }
                state.phase = (state.phase + 1) % self.decimate;
            }
        }
    }

    fn drain(&self) -> Vec<u8> {
        match self.state.lock() {
            Ok(mut state) => std::mem::take(&mut state.bytes),
            Err(_) => Vec::new(),
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tap: SampleTap,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            tap.ingest(data);
        },
        |err| {
            error!("input stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

fn capture_loop(
    config: CaptureConfig,
    stop: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let host = cpal::default_host();

    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(anyhow!("no audio input device available")));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(supported) => supported,
        Err(e) => {
            let _ = ready_tx.send(Err(anyhow!("failed to query input config: {}", e)));
            return;
        }
    };

    let source_rate = supported.sample_rate().0;
    let source_channels = supported.channels();
    let decimate = if config.sample_rate > 0 && source_rate > config.sample_rate {
        source_rate / config.sample_rate
    } else {
        1 // can't upsample, keep the device rate
    };

    let tap = SampleTap::new(source_channels, decimate);
    let stream_config: cpal::StreamConfig = supported.config();

    let built = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tap.clone()),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tap.clone()),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tap.clone()),
        other => Err(anyhow!("unsupported input sample format: {:?}", other)),
    };

    let stream = match built {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(anyhow!("failed to start input stream: {}", e)));
        return;
    }

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
    info!(
        "microphone capture started on {} ({} Hz, {} ch, decimate {}x)",
        device_name, source_rate, source_channels, decimate
    );

    if ready_tx.send(Ok(())).is_err() {
        return;
    }

    let interval = Duration::from_millis(config.chunk_duration_ms.max(10));

    while !stop.load(Ordering::Acquire) {
        thread::sleep(interval);

        let bytes = tap.drain();
        if bytes.is_empty() {
            continue;
        }

        if chunk_tx.blocking_send(AudioChunk::new(bytes)).is_err() {
            // Receiver is gone, nobody is listening any more
            break;
        }
    }

    // Release the device before the final flush so no samples land after it.
    drop(stream);

    let bytes = tap.drain();
    if !bytes.is_empty() {
        let _ = chunk_tx.blocking_send(AudioChunk::new(bytes));
    }

    info!("microphone capture stopped");
    // chunk_tx drops here, closing the channel and signalling completion
}
