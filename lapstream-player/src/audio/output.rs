//! Audio device output using cpal
//!
//! Drives a `MixerGraph` from a cpal output stream. cpal streams are not
//! `Send` on every platform, so the stream lives on a dedicated thread that
//! owns it until `DeviceOutput` is dropped. The same thread keeps the
//! playout ring topped up; the device callback only reads from the ring.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use super::graph::MixerGraph;
use super::playout::{PlayoutBuffer, PlayoutFeeder, PlayoutReader};
use crate::error::{Error, Result};

/// Preferred output rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Rendered audio held ahead of the device
const PLAYOUT_BUFFER_MS: u32 = 100;

/// How often the output thread tops up the playout ring
const FEED_INTERVAL: Duration = Duration::from_millis(5);

/// Running cpal output bound to a mixer
pub struct DeviceOutput {
    mixer: Arc<MixerGraph>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl DeviceOutput {
    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open a device (None = default) and start streaming the returned mixer.
    ///
    /// A requested device that does not exist falls back to the default.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<MixerGraph>>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::new(AtomicU32::new(0));

        let thread_error_flag = Arc::clone(&error_flag);
        let thread_error_count = Arc::clone(&error_count);

        let thread = std::thread::Builder::new()
            .name("lapstream-output".to_string())
            .spawn(move || {
                let started = Self::start_stream(device_name, thread_error_flag, thread_error_count);
                match started {
                    Ok((stream, mixer, mut feeder)) => {
                        if ready_tx.send(Ok(Arc::clone(&mixer))).is_err() {
                            return;
                        }
                        // Feed the ring until shutdown or the handle is dropped
                        loop {
                            match shutdown_rx.recv_timeout(FEED_INTERVAL) {
                                Err(RecvTimeoutError::Timeout) => {
                                    feeder.fill_from(&mixer);
                                }
                                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        drop(stream);
                        debug!("Audio output thread exiting ({} underruns)", feeder.underruns());
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let mixer = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".to_string()))??;

        Ok(Self {
            mixer,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            error_flag,
            error_count,
        })
    }

    /// Mixer fed to the device; hand it to the engine as its `AudioGraph`
    pub fn mixer(&self) -> Arc<MixerGraph> {
        Arc::clone(&self.mixer)
    }

    /// True once the stream reported an error
    pub fn has_errors(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn select_device(device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Using requested audio device: {}", name);
                return Ok(device);
            }
            warn!("Requested device '{}' not found, falling back to default device", name);
        }

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        Ok(device)
    }

    /// Prefer 44.1kHz stereo f32, otherwise the device default
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            return Ok((config.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE)).config(), sample_format));
        }

        let config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let sample_format = config.sample_format();
        Ok((config.config(), sample_format))
    }

    fn start_stream(
        device_name: Option<String>,
        error_flag: Arc<AtomicBool>,
        error_count: Arc<AtomicU32>,
    ) -> Result<(Stream, Arc<MixerGraph>, PlayoutFeeder)> {
        let device = Self::select_device(device_name.as_deref())?;
        let (config, sample_format) = Self::best_config(&device)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        let mixer = Arc::new(MixerGraph::new(config.sample_rate.0, config.channels));
        let capacity_frames = (config.sample_rate.0 * PLAYOUT_BUFFER_MS / 1000) as usize;
        let (mut feeder, reader) = PlayoutBuffer::new(capacity_frames, config.channels);
        // Prime the ring so the first callbacks have audio
        feeder.fill_from(&mixer);

        let on_error = move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            error_flag.store(true, Ordering::SeqCst);
            error_count.fetch_add(1, Ordering::SeqCst);
        };

        let stream = match sample_format {
            SampleFormat::F32 => {
                let mut reader = reader;
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| reader.read(data),
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut convert = ConvertingReader::new(reader);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let len = data.len();
                        for (out, sample) in data.iter_mut().zip(convert.read(len)) {
                            *out = (sample * i16::MAX as f32) as i16;
                        }
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let mut convert = ConvertingReader::new(reader);
                device.build_output_stream(
                    &config,
                    move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                        let len = data.len();
                        for (out, sample) in data.iter_mut().zip(convert.read(len)) {
                            *out = ((sample + 1.0) * 32767.5) as u16;
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other)));
            }
        }
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        info!("Audio stream started");
        Ok((stream, mixer, feeder))
    }
}

/// Reads f32 from the ring into a reusable scratch block for integer formats
struct ConvertingReader {
    reader: PlayoutReader,
    scratch: Vec<f32>,
}

impl ConvertingReader {
    fn new(reader: PlayoutReader) -> Self {
        Self {
            reader,
            scratch: Vec::new(),
        }
    }

    fn read(&mut self, len: usize) -> impl Iterator<Item = f32> + '_ {
        self.scratch.resize(len, 0.0);
        self.reader.read(&mut self.scratch);
        self.scratch.iter().copied()
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
    }
}
