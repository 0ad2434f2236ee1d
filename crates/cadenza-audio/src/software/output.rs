//! Audio output using cpal.
//!
//! The output callback only reads the ring buffer. Rendering is gated by
//! the engine's `playing` flag; while it is clear the device gets silence.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cadenza_core::{Error, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use tracing::{debug, error, info, warn};

use super::buffer::SharedRingBuffer;

/// Where an engine renders to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A cpal device by name, or the host default.
    Device(Option<String>),
    /// No device; buffered audio is consumed in real time.
    Null { sample_rate: u32 },
}

/// An open output. Not `Send` (cpal streams are thread-bound), so it is
/// created on the engine worker thread.
pub enum Output {
    Device(AudioOutput),
    Null(NullOutput),
}

impl Output {
    pub fn open(
        target: &OutputTarget,
        ring: SharedRingBuffer,
        playing: Arc<AtomicBool>,
    ) -> Result<Self> {
        match target {
            OutputTarget::Device(name) => {
                AudioOutput::open(name.as_deref(), ring, playing).map(Self::Device)
            }
            OutputTarget::Null { sample_rate } => Ok(Self::Null(NullOutput {
                sample_rate: *sample_rate,
                ring,
                playing,
                scratch: vec![0.0; 4096],
                clock: None,
                consumed: 0,
            })),
        }
    }

    pub const fn sample_rate(&self) -> u32 {
        match self {
            Self::Device(output) => output.sample_rate(),
            Self::Null(null) => null.sample_rate,
        }
    }

    /// Let a null output consume what is buffered. Devices pull on their
    /// own.
    pub fn pump(&mut self) {
        if let Self::Null(null) = self {
            null.drain();
        }
    }
}

/// Headless sink that consumes buffered audio at real-time pace.
pub struct NullOutput {
    sample_rate: u32,
    ring: SharedRingBuffer,
    playing: Arc<AtomicBool>,
    scratch: Vec<f32>,
    /// Start of the current playing stretch.
    clock: Option<Instant>,
    consumed: u64,
}

impl NullOutput {
    fn drain(&mut self) {
        if !self.playing.load(Ordering::Acquire) {
            self.clock = None;
            return;
        }

        let now = Instant::now();
        let started = *self.clock.get_or_insert_with(|| {
            self.consumed = 0;
            now
        });
        let due = (now.duration_since(started).as_secs_f64() * f64::from(self.sample_rate)) as u64
            * 2;

        while self.consumed < due {
            let owed = ((due - self.consumed) as usize).min(self.scratch.len());
            let read = self.ring.read(&mut self.scratch[..owed]);
            if read == 0 {
                // Underrun: don't burst to catch up later.
                self.consumed = due;
                break;
            }
            self.consumed += read as u64;
        }
    }
}

/// cpal output stream wrapper.
pub struct AudioOutput {
    _stream: Stream,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl AudioOutput {
    /// Open `device_name`, falling back to the host default when it is unset
    /// or not found.
    pub fn open(
        device_name: Option<&str>,
        ring: SharedRingBuffer,
        playing: Arc<AtomicBool>,
    ) -> Result<Self> {
        let device = select_device(device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;
        debug!("Supported output config: {supported_config:?}");

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, ring, playing)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, ring, playing)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, ring, playing)?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        info!(
            "Audio output opened: {device_name}, {} Hz, {} channels",
            config.sample_rate.0, config.channels
        );

        Ok(Self {
            _stream: stream,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            device_name,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn select_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        let found = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| n == name));
        match found {
            Some(device) => return Ok(device),
            None => warn!("Output device {name:?} not found, using default"),
        }
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    ring: SharedRingBuffer,
    playing: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = usize::from(config.channels);
    let mut scratch = vec![0.0f32; 8192];

    let err_fn = |err| {
        error!("Audio stream error: {err}");
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !playing.load(Ordering::Acquire) {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                let frames = data.len() / channels.max(1);
                if scratch.len() < frames * 2 {
                    scratch.resize(frames * 2, 0.0);
                }
                let read = ring.read(&mut scratch[..frames * 2]);
                scratch[read..frames * 2].fill(0.0);

                for (frame, out) in data.chunks_exact_mut(channels.max(1)).enumerate() {
                    let (l, r) = (scratch[frame * 2], scratch[frame * 2 + 1]);
                    map_frame(l, r, out);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
}

/// Write one stereo frame to a device frame of any width.
fn map_frame<T: cpal::SizedSample + cpal::FromSample<f32>>(left: f32, right: f32, out: &mut [T]) {
    match out {
        [mono] => *mono = T::from_sample(limit((left + right) * 0.5)),
        [l, r, rest @ ..] => {
            *l = T::from_sample(limit(left));
            *r = T::from_sample(limit(right));
            for sample in rest {
                *sample = T::from_sample(0.0f32);
            }
        }
        [] => {}
    }
}

/// Soft limiter, linear below 0.9.
fn limit(sample: f32) -> f32 {
    if sample.abs() > 0.9 {
        sample.tanh()
    } else {
        sample
    }
}

/// Names of the host's output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}
