//! `Coordinator` — per-invocation mode selection and the per-file pipeline.
//!
//! ## Pipelines
//!
//! ```text
//! Energy: decode → frame dBFS scores → threshold search ⟨merger inside⟩ → encode
//! Vad:    decode → model probabilities → merger (fixed threshold)       → encode
//! ```
//!
//! The mode is chosen once at construction and never switched mid-run.
//! One invariant is enforced unconditionally at construction:
//!
//! > VAD mode ⇒ no parallel threshold search and no multi-worker batch.
//!
//! A configuration that asks for VAD plus parallelism is downgraded to
//! VAD sequential; the downgrade is logged and surfaced on the resolved
//! configuration, never reported as an error.

pub mod batch;

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::energy::EnergyAnalyzer;
use crate::analysis::vad::VoiceActivityAdapter;
use crate::analysis::DEFAULT_FRAME_MS;
use crate::audio::codec;
use crate::error::{Result, TacetError};
use crate::model::ModelHandle;
use crate::report::{DetectionMode, ProcessingResult};
use crate::search::{SearchStrategy, ThresholdSearch, PRESET_THRESHOLDS_DBFS};
use crate::segment::{compute_stats, MergePolicy, SegmentMerger};

/// Caller-facing configuration for a `Coordinator`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Use the VAD model pipeline instead of energy thresholding.
    pub use_vad: bool,
    /// Timing rules and VAD threshold.
    pub policy: MergePolicy,
    /// Energy-mode frame length (ms). Default: 20. VAD mode derives its
    /// cadence from the model's frame size instead.
    pub frame_ms: u64,
    /// Evaluate energy-mode threshold candidates concurrently.
    pub parallel_threshold_search: bool,
    /// Worker pool size for batch processing (and for parallel threshold
    /// evaluation). 1 = sequential.
    pub worker_count: usize,
    /// Candidate dBFS thresholds for energy mode, scanned ascending.
    pub preset_thresholds: Vec<f32>,
    /// Replace the preset scan with adaptive bisection.
    pub adaptive_search: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_vad: false,
            policy: MergePolicy::default(),
            frame_ms: DEFAULT_FRAME_MS,
            parallel_threshold_search: false,
            worker_count: 1,
            preset_thresholds: PRESET_THRESHOLDS_DBFS.to_vec(),
            adaptive_search: false,
        }
    }
}

/// Effective configuration after invariant resolution. What actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub mode: DetectionMode,
    pub parallel_threshold_search: bool,
    pub worker_count: usize,
    /// True when a VAD + parallelism request was downgraded to sequential.
    pub parallelism_downgraded: bool,
}

/// Mode as explicit tagged state: the VAD variant carries its model, so an
/// energy coordinator cannot accidentally reach for one.
enum ModeState {
    Energy,
    Vad(ModelHandle),
}

/// Dispatches files through the pipeline selected at construction time.
pub struct Coordinator {
    config: EngineConfig,
    resolved: ResolvedConfig,
    mode: ModeState,
}

impl Coordinator {
    /// Validate the configuration and resolve the parallelism invariant.
    ///
    /// # Errors
    /// `TacetError::InvalidPolicy` for a bad merge policy, a zero frame
    /// length, or VAD mode without a model handle. Validation happens
    /// here, before any decoding.
    pub fn new(config: EngineConfig, model: Option<ModelHandle>) -> Result<Self> {
        config.policy.validate()?;
        if config.frame_ms == 0 {
            return Err(TacetError::InvalidPolicy(
                "frame duration must be positive".into(),
            ));
        }

        let requested_workers = config.worker_count.max(1);

        let (mode, resolved) = if config.use_vad {
            let model = model.ok_or_else(|| {
                TacetError::InvalidPolicy("VAD mode requires a model handle".into())
            })?;

            let downgraded = config.parallel_threshold_search || requested_workers > 1;
            if downgraded {
                warn!(
                    requested_parallel_search = config.parallel_threshold_search,
                    requested_workers,
                    "VAD mode forces sequential execution; parallelism request downgraded"
                );
            }
            (
                ModeState::Vad(model),
                ResolvedConfig {
                    mode: DetectionMode::Vad,
                    parallel_threshold_search: false,
                    worker_count: 1,
                    parallelism_downgraded: downgraded,
                },
            )
        } else {
            (
                ModeState::Energy,
                ResolvedConfig {
                    mode: DetectionMode::Energy,
                    parallel_threshold_search: config.parallel_threshold_search,
                    worker_count: requested_workers,
                    parallelism_downgraded: false,
                },
            )
        };

        info!(
            mode = ?resolved.mode,
            workers = resolved.worker_count,
            parallel_search = resolved.parallel_threshold_search,
            "coordinator ready"
        );

        Ok(Self {
            config,
            resolved,
            mode,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The effective configuration, including any downgrade applied.
    pub fn resolved(&self) -> ResolvedConfig {
        self.resolved
    }

    /// Process one file: decode, segment, re-encode the retained audio to
    /// `output` in the input's container/codec.
    pub fn process_file(&self, input: &Path, output: &Path) -> Result<ProcessingResult> {
        let format = codec::detect_format_codec(input)?;
        info!(
            input = %input.display(),
            container = format.container,
            codec = format.codec.unwrap_or("default"),
            "processing file"
        );

        let waveform = codec::decode(input)?;
        let mono = waveform.mono();
        let total_ms = waveform.duration_ms();

        let (mut intervals, chosen_threshold_dbfs) = match &self.mode {
            ModeState::Energy => {
                let analyzer = EnergyAnalyzer::new(self.config.frame_ms);
                let scores: Vec<f32> = analyzer.scores(&mono, waveform.sample_rate)?.collect();
                let merger = SegmentMerger::new(self.config.policy.clone(), self.config.frame_ms)?;

                let strategy = if self.config.adaptive_search {
                    SearchStrategy::Adaptive
                } else {
                    SearchStrategy::Preset(self.config.preset_thresholds.clone())
                };
                let search = ThresholdSearch::new(
                    strategy,
                    self.resolved.parallel_threshold_search,
                    self.resolved.worker_count,
                );
                let outcome = search.run(&scores, &merger, total_ms)?;
                (outcome.intervals, Some(outcome.threshold_dbfs))
            }
            ModeState::Vad(model) => {
                let adapter = VoiceActivityAdapter::new(model.clone());
                let (decisions, frame_ms) =
                    adapter.decisions(&mono, waveform.sample_rate, self.config.policy.vad_threshold)?;
                let merger = SegmentMerger::new(self.config.policy.clone(), frame_ms)?;
                let intervals = merger.merge(&decisions);
                if intervals.is_empty() {
                    return Err(TacetError::NoSpeechDetected);
                }
                (intervals, None)
            }
        };

        // Frame-quantised ends may overshoot the real duration by a
        // fraction of a frame.
        if let Some(last) = intervals.last_mut() {
            last.end_ms = last.end_ms.min(total_ms);
        }

        let original_size_bytes = fs::metadata(input)?.len();
        let output_size_bytes = codec::encode(output, &waveform, &intervals)?;
        let stats = compute_stats(&intervals, total_ms);

        info!(
            input = %input.display(),
            output = %output.display(),
            threshold_dbfs = ?chosen_threshold_dbfs,
            keep_ms = stats.total_keep_ms,
            cut_ms = stats.total_cut_ms,
            keep_ratio = format_args!("{:.2}", stats.keep_ratio),
            "file processed"
        );

        Ok(ProcessingResult {
            output_path: output.to_path_buf(),
            original_size_bytes,
            output_size_bytes,
            keep_intervals: intervals,
            chosen_threshold_dbfs,
            mode: self.resolved.mode,
            stats,
        })
    }
}
