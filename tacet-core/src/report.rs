//! Result and report types handed back to presentation layers.
//!
//! Everything here serialises to camelCase JSON so GUI/Web front ends can
//! consume reports without a mapping layer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TacetError;
use crate::segment::{KeepInterval, SegmentStats};

/// Which detection strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// dBFS loudness thresholding with threshold search.
    Energy,
    /// Neural voice-activity model with a single fixed threshold.
    Vad,
}

/// Per-file outcome of a successful run. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub output_path: PathBuf,
    pub original_size_bytes: u64,
    pub output_size_bytes: u64,
    pub keep_intervals: Vec<KeepInterval>,
    /// The accepted dBFS threshold; `None` in VAD mode (no search ran).
    pub chosen_threshold_dbfs: Option<f32>,
    pub mode: DetectionMode,
    pub stats: SegmentStats,
}

/// Error classification for failure records, mirroring the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Decode,
    UnsupportedFormat,
    ModelInference,
    NoValidThreshold,
    NoSpeechDetected,
    InvalidPolicy,
    Io,
    Other,
}

impl From<&TacetError> for FailureKind {
    fn from(err: &TacetError) -> Self {
        match err {
            TacetError::Decode(_) => FailureKind::Decode,
            TacetError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            TacetError::ModelInference(_) => FailureKind::ModelInference,
            TacetError::NoValidThreshold => FailureKind::NoValidThreshold,
            TacetError::NoSpeechDetected => FailureKind::NoSpeechDetected,
            TacetError::InvalidPolicy(_) => FailureKind::InvalidPolicy,
            TacetError::Io(_) => FailureKind::Io,
            TacetError::Other(_) => FailureKind::Other,
        }
    }
}

/// One entry of a batch report: success with a result, or a captured
/// failure with its specific kind. A failure never aborts the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum FileOutcome {
    #[serde(rename = "ok")]
    Success {
        input: PathBuf,
        result: ProcessingResult,
    },
    #[serde(rename = "failed")]
    Failure {
        input: PathBuf,
        kind: FailureKind,
        message: String,
    },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success { .. })
    }
}

/// Aggregate statistics over a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Input bytes of successfully processed files.
    pub original_size_bytes: u64,
    /// Output bytes of successfully processed files.
    pub output_size_bytes: u64,
}

/// Ordered per-file outcomes plus the aggregate summary. Outcome order
/// always matches the input file order, regardless of worker scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<FileOutcome>) -> Self {
        let mut summary = BatchSummary {
            total_files: outcomes.len(),
            succeeded: 0,
            failed: 0,
            original_size_bytes: 0,
            output_size_bytes: 0,
        };
        for outcome in &outcomes {
            match outcome {
                FileOutcome::Success { result, .. } => {
                    summary.succeeded += 1;
                    summary.original_size_bytes += result.original_size_bytes;
                    summary.output_size_bytes += result.output_size_bytes;
                }
                FileOutcome::Failure { .. } => summary.failed += 1,
            }
        }
        Self { outcomes, summary }
    }
}
