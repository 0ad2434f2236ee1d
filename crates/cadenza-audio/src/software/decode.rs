//! File decoding using symphonia.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fs::File;
use std::path::Path;

use cadenza_core::{Error, Result};
use symphonia::core::{
    audio::{AudioBufferRef, Signal},
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};
use tracing::{debug, warn};

/// Decoder for one audio file.
pub struct FileDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl FileDecoder {
    /// Probe `path` and prepare a decoder for its first audio track.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Resource(format!("{}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to detect format: {e}")))?;
        let format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::AudioDecode("Unknown sample rate".to_string()))?;
        let channels = track.codec_params.channels.map_or(2, |c| c.count() as u16);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to create decoder: {e}")))?;

        debug!(
            "Opened {}: track {track_id}, {sample_rate} Hz, {channels} channels",
            path.display()
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode the next packet as interleaved stereo. `None` at end of
    /// stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let samples = interleave(&decoded);
                    return Ok(Some(to_stereo(&samples, usize::from(self.channels))));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {e}");
                }
                Err(e) => return Err(Error::AudioDecode(format!("Decode failed: {e}"))),
            }
        }
    }

    /// Seek to `position_ms`.
    pub fn seek(&mut self, position_ms: u64) -> Result<()> {
        let time = Time::from(position_ms as f64 / 1000.0);
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::AudioDecode(format!("Seek failed: {e}")))?;
        self.decoder.reset();
        Ok(())
    }

    /// Total duration, when the container declares it.
    pub fn duration_ms(&self) -> Option<u64> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)?;
        let time_base = track.codec_params.time_base?;
        let n_frames = track.codec_params.n_frames?;
        let time = time_base.calc_time(n_frames);
        Some(time.seconds * 1000 + (time.frac * 1000.0) as u64)
    }
}

/// Flatten a decoded buffer into interleaved f32.
fn interleave(buffer: &AudioBufferRef<'_>) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => interleave_with(buf.planes().planes(), |s| s),
        AudioBufferRef::F64(buf) => interleave_with(buf.planes().planes(), |s| s as f32),
        AudioBufferRef::S32(buf) => {
            interleave_with(buf.planes().planes(), |s| s as f32 / i32::MAX as f32)
        }
        AudioBufferRef::S16(buf) => interleave_with(buf.planes().planes(), |s| {
            f32::from(s) / f32::from(i16::MAX)
        }),
        AudioBufferRef::U8(buf) => {
            interleave_with(buf.planes().planes(), |s| (f32::from(s) - 128.0) / 128.0)
        }
        _ => Vec::new(),
    }
}

fn interleave_with<S: Copy>(planes: &[&[S]], convert: impl Fn(S) -> f32) -> Vec<f32> {
    let Some(first) = planes.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut output = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(convert(plane[frame]));
        }
    }
    output
}

/// Fold interleaved audio with `channels` channels to stereo.
///
/// Mono is duplicated; beyond two channels the front pair is kept.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
