//! Real audio output using CPAL (Cross-Platform Audio Library).
//!
//! `cpal::Stream` is not `Send`, so each voice owns a dedicated audio thread
//! that holds the stream and receives commands over a channel. `begin` and
//! `stop` just post commands; timing is tracked by the scheduler.

use crate::audio::chunk::AudioChunk;
use crate::audio::voice::VoiceSink;
use crate::error::{Result, VoxtalkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum VoiceCommand {
    Play {
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    },
    Stop,
}

/// Playback voice backed by a CPAL output stream.
pub struct CpalVoice {
    commands: mpsc::UnboundedSender<VoiceCommand>,
}

impl CpalVoice {
    /// Creates a voice on the given output device (None = system default).
    ///
    /// # Errors
    /// Returns `VoxtalkError::PlaybackDevice` if no matching output device
    /// exists.
    pub fn open(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| VoxtalkError::PlaybackDevice {
                    message: format!("failed to enumerate output devices: {e}"),
                })?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| VoxtalkError::PlaybackDevice {
                    message: format!("output device not found: {name}"),
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| VoxtalkError::PlaybackDevice {
                    message: "no default output device".to_string(),
                })?,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || voice_thread(device, rx));
        Ok(Self { commands: tx })
    }

    /// Lists the names of all available output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| VoxtalkError::PlaybackDevice {
                message: format!("failed to enumerate output devices: {e}"),
            })?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl VoiceSink for CpalVoice {
    fn begin(&self, chunk: &AudioChunk) -> Result<()> {
        self.commands
            .send(VoiceCommand::Play {
                samples: chunk.samples.clone(),
                sample_rate: chunk.sample_rate,
                channels: chunk.channels,
            })
            .map_err(|_| VoxtalkError::Playback {
                message: "audio thread is gone".to_string(),
            })
    }

    fn stop(&self) {
        // Ignore send failure: a dead audio thread is already stopped.
        let _ = self.commands.send(VoiceCommand::Stop);
    }
}

/// Audio thread: owns the CPAL stream for one voice.
///
/// A new stream is built per chunk so each chunk plays at its native rate
/// and channel count. Exits when the command channel closes.
fn voice_thread(device: cpal::Device, mut rx: mpsc::UnboundedReceiver<VoiceCommand>) {
    let mut active: Option<cpal::Stream> = None;

    while let Some(command) = rx.blocking_recv() {
        match command {
            VoiceCommand::Play {
                samples,
                sample_rate,
                channels,
            } => {
                active = None; // tear down any previous stream first
                match build_stream(&device, samples, sample_rate, channels) {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::warn!("failed to start output stream: {e}");
                        } else {
                            active = Some(stream);
                        }
                    }
                    Err(e) => tracing::warn!("failed to build output stream: {e}"),
                }
            }
            VoiceCommand::Stop => {
                active = None;
            }
        }
    }
    drop(active);
}

fn build_stream(
    device: &cpal::Device,
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::Stream> {
    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let queue = Arc::new(Mutex::new(VecDeque::from(samples)));
    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _| {
                let mut queue = match queue.lock() {
                    Ok(q) => q,
                    Err(_) => return,
                };
                for slot in out.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0.0);
                }
            },
            |e| tracing::warn!("output stream error: {e}"),
            None,
        )
        .map_err(|e| VoxtalkError::PlaybackDevice {
            message: format!("failed to open output stream: {e}"),
        })?;

    Ok(stream)
}
