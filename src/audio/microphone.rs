//! Microphone capture using cpal
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread that
//! parks until the backend is stopped.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<Result<()>>();

        let config = self.config.clone();
        let capturing = Arc::clone(&self.capturing);

        let thread = std::thread::spawn(move || {
            let stream = match build_stream(&config, frame_tx, Arc::clone(&capturing)) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            capturing.store(true, Ordering::SeqCst);
            let _ = ready_tx.send(Ok(()));

            // Blocks until stop() or the backend is dropped
            let _ = stop_rx.recv();
            capturing.store(false, Ordering::SeqCst);
            drop(stream);
            info!("Microphone capture thread exited");
        });

        ready_rx
            .await
            .context("Microphone capture thread exited during startup")??;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join microphone thread")?
                .map_err(|_| anyhow::anyhow!("Microphone thread panicked"))?;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn build_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    capturing: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No default input device")?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio device: {}", device_name);

    let stream_config = cpal::StreamConfig {
        channels: config.target_channels,
        sample_rate: cpal::SampleRate(config.target_sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut assembler = FrameAssembler::new(config);

    // Dropping the sender closes the frame channel, which is how a device
    // failure reaches the consumer.
    let data_tx = Arc::new(Mutex::new(Some(frame_tx)));
    let error_tx = Arc::clone(&data_tx);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let frames = assembler.push(data);
                if frames.is_empty() {
                    return;
                }

                let guard = data_tx.lock().unwrap_or_else(|e| e.into_inner());
                let Some(tx) = guard.as_ref() else {
                    return;
                };
                for frame in frames {
                    if tx.try_send(frame).is_err() {
                        warn!("Dropping microphone frame, receiver is behind or gone");
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
                capturing.store(false, Ordering::SeqCst);
                error_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
            },
            None,
        )
        .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;

    Ok(stream)
}
