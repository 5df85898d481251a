//! Silero VAD v5 backend via the `voice_activity_detector` crate.
//!
//! The crate bundles the ONNX model, so there is no download or model-path
//! plumbing. Silero v5 accepts exactly two input shapes:
//!
//! | Rate   | Frame size | Frame duration |
//! |--------|------------|----------------|
//! | 8 kHz  | 256        | 32 ms          |
//! | 16 kHz | 512        | 32 ms          |

use tracing::{debug, info};
use voice_activity_detector::VoiceActivityDetector;

use super::VadModel;
use crate::error::{Result, TacetError};

/// Neural VAD over the bundled Silero v5 model.
pub struct SileroVad {
    vad: VoiceActivityDetector,
    sample_rate: u32,
    frame_size: usize,
}

impl SileroVad {
    /// Build a detector for `sample_rate` (8000 or 16000 Hz).
    ///
    /// # Errors
    /// `TacetError::ModelInference` for unsupported rates or if the ONNX
    /// session fails to initialise.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let frame_size = match sample_rate {
            8_000 => 256,
            16_000 => 512,
            other => {
                return Err(TacetError::ModelInference(format!(
                    "Silero VAD supports 8000 or 16000 Hz, got {other}"
                )))
            }
        };

        let vad = build_detector(sample_rate, frame_size)?;

        info!(sample_rate, frame_size, "Silero VAD v5 ready");

        Ok(Self {
            vad,
            sample_rate,
            frame_size,
        })
    }
}

fn build_detector(sample_rate: u32, frame_size: usize) -> Result<VoiceActivityDetector> {
    VoiceActivityDetector::builder()
        .sample_rate(sample_rate as i64)
        .chunk_size(frame_size)
        .build()
        .map_err(|e| TacetError::ModelInference(format!("failed to create Silero VAD: {e:?}")))
}

impl VadModel for SileroVad {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn infer(&mut self, frame: &[f32]) -> Result<f32> {
        if frame.len() != self.frame_size {
            return Err(TacetError::ModelInference(format!(
                "frame of {} samples, model expects {}",
                frame.len(),
                self.frame_size
            )));
        }
        Ok(self.vad.predict(frame.iter().copied()))
    }

    fn reset(&mut self) {
        // The crate exposes no reset; rebuilding clears the hidden state.
        if let Ok(fresh) = build_detector(self.sample_rate, self.frame_size) {
            self.vad = fresh;
            debug!("Silero VAD state reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_sample_rate() {
        let err = SileroVad::new(44_100).err().unwrap();
        assert!(matches!(err, TacetError::ModelInference(_)));
    }

    #[test]
    fn frame_sizes_match_model_contract() {
        assert_eq!(SileroVad::new(16_000).unwrap().frame_size(), 512);
        assert_eq!(SileroVad::new(8_000).unwrap().frame_size(), 256);
    }

    #[test]
    fn wrong_frame_shape_is_an_inference_error() {
        let mut vad = SileroVad::new(16_000).unwrap();
        let err = vad.infer(&[0.0f32; 100]).err().unwrap();
        assert!(matches!(err, TacetError::ModelInference(_)));
    }

    #[test]
    fn silence_scores_low_probability() {
        let mut vad = SileroVad::new(16_000).unwrap();
        let prob = vad.infer(&[0.0f32; 512]).unwrap();
        assert!(prob < 0.5, "silence scored {prob}");
    }
}
