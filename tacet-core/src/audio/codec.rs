//! WAV decode/encode via hound, plus container/codec detection.
//!
//! The output container and codec must equal the input's; no transcoding
//! happens anywhere in the engine. WAV is carried natively. Other known
//! audio extensions are recognised by `detect_format_codec` but refused at
//! decode time with `UnsupportedFormat`, never silently converted.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::error::{Result, TacetError};
use crate::segment::KeepInterval;

use super::{SampleEncoding, Waveform};

/// Container/codec pair detected from a file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub container: &'static str,
    /// `None` means the container's default codec.
    pub codec: Option<&'static str>,
}

/// Map a path to its container and codec.
///
/// Used to pin the encoder's output format before any decoding happens.
///
/// # Errors
/// `TacetError::UnsupportedFormat` for extensions outside the known set.
pub fn detect_format_codec(path: &Path) -> Result<AudioFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let format = match ext.as_str() {
        "wav" => AudioFormat {
            container: "wav",
            codec: None,
        },
        "mp3" => AudioFormat {
            container: "mp3",
            codec: None,
        },
        "flac" => AudioFormat {
            container: "flac",
            codec: None,
        },
        "ogg" => AudioFormat {
            container: "ogg",
            codec: None,
        },
        "m4a" => AudioFormat {
            container: "mp4",
            codec: Some("aac"),
        },
        _ => {
            return Err(TacetError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    Ok(format)
}

/// Decode an audio file into a `Waveform`.
///
/// # Errors
/// - `TacetError::UnsupportedFormat` for anything that is not a WAV file.
/// - `TacetError::Decode` for malformed or empty WAV data.
pub fn decode(path: &Path) -> Result<Waveform> {
    let format = detect_format_codec(path)?;
    if format.container != "wav" {
        return Err(TacetError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let mut reader =
        WavReader::open(path).map_err(|e| TacetError::Decode(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    let (samples, encoding) = match spec.sample_format {
        SampleFormat::Float => {
            let samples: std::result::Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            let samples = samples.map_err(|e| TacetError::Decode(e.to_string()))?;
            (samples, SampleEncoding::Float)
        }
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            let samples: std::result::Result<Vec<i32>, _> = reader.samples::<i32>().collect();
            let samples = samples
                .map_err(|e| TacetError::Decode(e.to_string()))?
                .into_iter()
                .map(|s| s as f32 / scale)
                .collect();
            (
                samples,
                SampleEncoding::Int {
                    bits: spec.bits_per_sample,
                },
            )
        }
    };

    let waveform = Waveform::new(samples, spec.sample_rate, spec.channels, encoding);

    if waveform.is_empty() || waveform.duration_ms() == 0 {
        return Err(TacetError::Decode(format!(
            "{}: empty audio stream",
            path.display()
        )));
    }

    debug!(
        path = %path.display(),
        sample_rate = waveform.sample_rate,
        channels = waveform.channels,
        duration_ms = waveform.duration_ms(),
        "decoded waveform"
    );

    Ok(waveform)
}

/// Encode the retained intervals of `waveform` to `path` with the source
/// spec (rate, channels, bit depth, int/float) and return the output size
/// in bytes.
///
/// Interval bounds are clamped to the waveform's duration; out-of-range
/// milliseconds never panic.
pub fn encode(path: &Path, waveform: &Waveform, intervals: &[KeepInterval]) -> Result<u64> {
    let (bits_per_sample, sample_format) = match waveform.encoding {
        SampleEncoding::Int { bits } => (bits, SampleFormat::Int),
        SampleEncoding::Float => (32, SampleFormat::Float),
    };
    let spec = WavSpec {
        channels: waveform.channels,
        sample_rate: waveform.sample_rate,
        bits_per_sample,
        sample_format,
    };

    let mut writer =
        WavWriter::create(path, spec).map_err(|e| TacetError::Decode(e.to_string()))?;

    let ch = waveform.channels as usize;
    let frame_count = waveform.frame_count();

    for interval in intervals {
        let start = ms_to_frame(interval.start_ms, waveform.sample_rate).min(frame_count);
        let end = ms_to_frame(interval.end_ms, waveform.sample_rate).min(frame_count);
        if start >= end {
            continue;
        }

        let slice = &waveform.samples[start * ch..end * ch];
        match waveform.encoding {
            SampleEncoding::Float => {
                for &s in slice {
                    writer
                        .write_sample(s)
                        .map_err(|e| TacetError::Decode(e.to_string()))?;
                }
            }
            SampleEncoding::Int { bits } => {
                let scale = (1i64 << (bits - 1)) as f32;
                let max = (1i64 << (bits - 1)) - 1;
                let min = -(1i64 << (bits - 1));
                for &s in slice {
                    let v = ((s * scale).round() as i64).clamp(min, max) as i32;
                    writer
                        .write_sample(v)
                        .map_err(|e| TacetError::Decode(e.to_string()))?;
                }
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| TacetError::Decode(e.to_string()))?;

    let bytes = std::fs::metadata(path)?.len();
    info!(
        path = %path.display(),
        intervals = intervals.len(),
        bytes,
        "encoded output"
    );
    Ok(bytes)
}

fn ms_to_frame(ms: u64, sample_rate: u32) -> usize {
    (ms * sample_rate as u64 / 1000) as usize
}
