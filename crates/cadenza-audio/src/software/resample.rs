//! Rate conversion from the source rate to the device rate, with a
//! variable playback speed on top.
//!
//! Speed is realised as varispeed: the resample ratio is scaled by
//! `1 / speed`, so pitch follows speed.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::ops::RangeInclusive;

use cadenza_core::{Error, Result};
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use tracing::debug;

/// Speeds the resampler can realise.
pub const SPEED_RANGE: RangeInclusive<f32> = 0.25..=4.0;

const CHUNK_FRAMES: usize = 1024;
const CHANNELS: usize = 2;

/// Stereo varispeed resampler.
pub struct Varispeed {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    speed: f32,
    /// Deinterleaved input waiting for a full chunk.
    pending: [Vec<f32>; CHANNELS],
}

impl Varispeed {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let max_relative = f64::from(*SPEED_RANGE.end()).max(1.0 / f64::from(*SPEED_RANGE.start()));
        let resampler = SincFixedIn::new(
            f64::from(output_rate) / f64::from(input_rate),
            max_relative,
            params,
            CHUNK_FRAMES,
            CHANNELS,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {e}")))?;

        debug!("Resampler created: {input_rate} Hz -> {output_rate} Hz");

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            speed: 1.0,
            pending: [Vec::new(), Vec::new()],
        })
    }

    pub const fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<()> {
        if !speed.is_finite() || !SPEED_RANGE.contains(&speed) {
            return Err(Error::OutOfRange(format!("playback speed {speed}")));
        }
        self.resampler
            .set_resample_ratio_relative(1.0 / f64::from(speed), true)
            .map_err(|e| Error::OutOfRange(format!("playback speed {speed}: {e}")))?;
        self.speed = speed;
        Ok(())
    }

    /// Source frames buffered but not yet converted.
    pub fn pending_frames(&self) -> usize {
        self.pending[0].len()
    }

    /// Filter delay expressed in source frames.
    pub fn latency_frames(&self) -> f64 {
        self.resampler.output_delay() as f64 * self.input_per_output()
    }

    /// Source frames consumed per output frame at the current speed.
    pub fn input_per_output(&self) -> f64 {
        f64::from(self.input_rate) * f64::from(self.speed) / f64::from(self.output_rate)
    }

    /// Convert interleaved stereo input; returns whatever full chunks
    /// produced.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        for frame in input.chunks_exact(CHANNELS) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();
            let converted = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;
            interleave_into(&converted, usize::MAX, &mut output);
        }
        Ok(output)
    }

    /// Convert whatever is still pending at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let remaining = self.pending_frames();
        if remaining == 0 {
            return Ok(Vec::new());
        }
        let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let converted = self
            .resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;

        let frames = (remaining as f64 / self.input_per_output()).ceil() as usize;
        let mut output = Vec::new();
        interleave_into(&converted, frames, &mut output);
        Ok(output)
    }

    /// Drop buffered input and filter state, e.g. after a seek.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.pending.iter_mut().for_each(Vec::clear);
        if (self.speed - 1.0).abs() > f32::EPSILON {
            let _ = self
                .resampler
                .set_resample_ratio_relative(1.0 / f64::from(self.speed), false);
        }
    }
}

fn interleave_into(channels: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = channels.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * channels.len());
    for frame in 0..frames {
        for ch in channels {
            output.push(ch[frame]);
        }
    }
}
