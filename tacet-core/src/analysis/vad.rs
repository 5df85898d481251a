//! Voice-activity adapter: waveform in, per-frame speech probabilities out.
//!
//! The adapter owns the glue between arbitrary input audio and a fixed
//! frame/rate model: resample the mono mixdown to the model rate, slice it
//! into the model's frame size, and collect one probability per frame at a
//! fixed cadence. Probabilities are thresholded into `FrameDecision`s with
//! the policy's `vad_threshold`.

use tracing::debug;

use super::FrameDecision;
use crate::audio::resample::resample;
use crate::error::{Result, TacetError};
use crate::model::ModelHandle;

/// Bridges a `VadModel` into the frame-decision pipeline.
pub struct VoiceActivityAdapter {
    model: ModelHandle,
}

impl VoiceActivityAdapter {
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    /// Per-frame speech probabilities for a mono buffer, plus the frame
    /// duration in milliseconds.
    ///
    /// The model's state is reset before the first frame so one stream
    /// never leaks hidden state into the next. A trailing partial frame is
    /// dropped (the model rejects short frames by contract).
    ///
    /// # Errors
    /// - `TacetError::Decode` on an empty buffer.
    /// - `TacetError::ModelInference` if the model rejects a frame; fatal
    ///   for this file, not retried, propagated to the caller.
    pub fn probabilities(&self, samples: &[f32], sample_rate: u32) -> Result<(Vec<f32>, u64)> {
        if samples.is_empty() {
            return Err(TacetError::Decode("empty waveform".into()));
        }

        let mut model = self.model.0.lock();
        let model_rate = model.sample_rate();
        let frame_size = model.frame_size();
        let frame_ms = frame_size as u64 * 1000 / model_rate as u64;

        let resampled;
        let audio: &[f32] = if sample_rate == model_rate {
            samples
        } else {
            resampled = resample(samples, sample_rate, model_rate)?;
            &resampled
        };

        model.reset();

        let mut probs = Vec::with_capacity(audio.len() / frame_size + 1);
        for frame in audio.chunks_exact(frame_size) {
            probs.push(model.infer(frame)?);
        }

        debug!(
            frames = probs.len(),
            frame_ms,
            input_rate = sample_rate,
            model_rate,
            "VAD frame probabilities collected"
        );

        Ok((probs, frame_ms))
    }

    /// Probabilities thresholded into decisions at `vad_threshold`.
    pub fn decisions(
        &self,
        samples: &[f32],
        sample_rate: u32,
        vad_threshold: f32,
    ) -> Result<(Vec<FrameDecision>, u64)> {
        let (probs, frame_ms) = self.probabilities(samples, sample_rate)?;
        let decisions = probs
            .into_iter()
            .map(|p| FrameDecision::from_score(p, vad_threshold))
            .collect();
        Ok((decisions, frame_ms))
    }
}
