//! Frame loudness analysis: per-frame dBFS scores from RMS amplitude.
//!
//! dBFS is measured against full scale (1.0), so scores are typically
//! negative; digital silence scores negative infinity and can never reach
//! any finite threshold.

use super::FrameDecision;
use crate::error::{Result, TacetError};

/// Computes a lazy, ordered, finite sequence of per-frame dBFS scores.
///
/// Pure: no side effects, no state between calls.
#[derive(Debug, Clone, Copy)]
pub struct EnergyAnalyzer {
    frame_ms: u64,
}

impl EnergyAnalyzer {
    pub fn new(frame_ms: u64) -> Self {
        Self { frame_ms }
    }

    pub fn frame_ms(&self) -> u64 {
        self.frame_ms
    }

    /// Per-frame dBFS scores over a mono sample buffer, in time order.
    ///
    /// The final frame may be shorter than the configured length; it is
    /// scored over the samples it has.
    ///
    /// # Errors
    /// `TacetError::Decode` if the buffer is empty or the frame length
    /// resolves to zero samples.
    pub fn scores<'a>(
        &self,
        samples: &'a [f32],
        sample_rate: u32,
    ) -> Result<impl Iterator<Item = f32> + 'a> {
        if samples.is_empty() {
            return Err(TacetError::Decode("empty waveform".into()));
        }
        let frame_len = (sample_rate as u64 * self.frame_ms / 1000) as usize;
        if frame_len == 0 {
            return Err(TacetError::Decode(format!(
                "frame of {} ms holds no samples at {} Hz",
                self.frame_ms, sample_rate
            )));
        }

        Ok(samples.chunks(frame_len).map(|frame| dbfs(rms(frame))))
    }

    /// Convenience: scores thresholded into frame decisions.
    pub fn decisions(
        &self,
        samples: &[f32],
        sample_rate: u32,
        threshold_dbfs: f32,
    ) -> Result<Vec<FrameDecision>> {
        Ok(self
            .scores(samples, sample_rate)?
            .map(|score| FrameDecision::from_score(score, threshold_dbfs))
            .collect())
    }
}

impl Default for EnergyAnalyzer {
    fn default() -> Self {
        Self::new(super::DEFAULT_FRAME_MS)
    }
}

/// Threshold precomputed scores without re-scanning audio. The threshold
/// search evaluates many candidates against one shared score buffer.
pub fn decisions_from_scores(scores: &[f32], threshold_dbfs: f32) -> Vec<FrameDecision> {
    scores
        .iter()
        .map(|&score| FrameDecision::from_score(score, threshold_dbfs))
        .collect()
}

/// Root-mean-square of a sample slice.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// RMS amplitude to decibels relative to full scale.
fn dbfs(rms: f32) -> f32 {
    if rms <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn square_wave_at_half_scale_scores_minus_six_dbfs() {
        // RMS of a ±0.5 square wave is 0.5 → 20·log10(0.5) ≈ −6.02 dBFS.
        let samples: Vec<f32> = (0..320)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let analyzer = EnergyAnalyzer::new(20);
        let scores: Vec<f32> = analyzer.scores(&samples, 16_000).unwrap().collect();
        assert_eq!(scores.len(), 1);
        assert_relative_eq!(scores[0], -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn digital_silence_scores_negative_infinity() {
        let analyzer = EnergyAnalyzer::new(20);
        let scores: Vec<f32> = analyzer.scores(&[0.0f32; 640], 16_000).unwrap().collect();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| *s == f32::NEG_INFINITY));
    }

    #[test]
    fn frame_count_covers_partial_tail() {
        // 500 samples at 16 kHz with 20 ms frames (320 samples): one full
        // frame plus a 180-sample tail.
        let analyzer = EnergyAnalyzer::new(20);
        let scores: Vec<f32> = analyzer.scores(&[0.1f32; 500], 16_000).unwrap().collect();
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn empty_waveform_is_a_decode_error() {
        let analyzer = EnergyAnalyzer::default();
        let err = analyzer.scores(&[], 16_000).err().unwrap();
        assert!(matches!(err, TacetError::Decode(_)));
    }

    #[test]
    fn decisions_split_loud_and_quiet_frames() {
        // One loud 20 ms frame followed by one silent frame.
        let mut samples = vec![0.5f32; 320];
        samples.extend(vec![0.0f32; 320]);
        let analyzer = EnergyAnalyzer::new(20);
        let d = analyzer.decisions(&samples, 16_000, -20.0).unwrap();
        assert_eq!(d, vec![FrameDecision::Voiced, FrameDecision::Silent]);
    }

    #[test]
    fn scores_and_precomputed_decisions_agree() {
        let samples: Vec<f32> = (0..3200).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();
        let analyzer = EnergyAnalyzer::new(20);
        let scores: Vec<f32> = analyzer.scores(&samples, 16_000).unwrap().collect();
        let direct = analyzer.decisions(&samples, 16_000, -12.0).unwrap();
        assert_eq!(decisions_from_scores(&scores, -12.0), direct);
    }
}
