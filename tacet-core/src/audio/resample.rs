//! Offline sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! The VAD model consumes fixed-size frames at a fixed rate (16 kHz),
//! while input files arrive at whatever rate they were recorded at.
//! `resample` converts a whole mono buffer in one call; when the rates
//! already match it returns the input unchanged.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{Result, TacetError};

/// Input frames fed to rubato per process call.
const CHUNK: usize = 1024;

/// Convert a mono f32 buffer from `from_rate` to `to_rate`.
///
/// The tail shorter than one rubato chunk is zero-padded before the final
/// process call, so the output may carry up to one chunk of trailing
/// near-silence. That is harmless for frame classification, which is the
/// only consumer of resampled audio.
///
/// # Errors
/// Returns `TacetError::Decode` if rubato fails to initialise or process.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(TacetError::Decode(format!(
            "cannot resample from {from_rate} Hz to {to_rate} Hz"
        )));
    }

    let ratio = to_rate as f64 / from_rate as f64;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio, no dynamic adjustment
        PolynomialDegree::Cubic,
        CHUNK,
        1, // mono
    )
    .map_err(|e| TacetError::Decode(format!("resampler init: {e}")))?;

    let max_out = resampler.output_frames_max();
    let mut output_buf = vec![vec![0f32; max_out]; 1];
    let mut out = Vec::with_capacity((samples.len() as f64 * ratio) as usize + max_out);

    let mut chunk = vec![0f32; CHUNK];
    for block in samples.chunks(CHUNK) {
        let input: &[f32] = if block.len() == CHUNK {
            block
        } else {
            // Final partial block: zero-pad to a full chunk.
            chunk[..block.len()].copy_from_slice(block);
            chunk[block.len()..].fill(0.0);
            &chunk
        };

        let (_consumed, produced) = resampler
            .process_into_buffer(&[input], &mut output_buf, None)
            .map_err(|e| TacetError::Decode(format!("resampler process: {e}")))?;
        out.extend_from_slice(&output_buf[0][..produced]);
    }

    Ok(out)
}
