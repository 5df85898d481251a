//! dBFS threshold search for energy mode.
//!
//! Each candidate threshold is scored by thresholding one shared buffer of
//! precomputed frame scores and running the segment merger; a candidate is
//! valid when it keeps something but not everything (detection actually
//! did work). Two candidate sources:
//!
//! - **Preset list**: scanned ascending, first valid candidate wins.
//!   With parallel evaluation enabled, all candidates are evaluated
//!   concurrently and the outcomes are collected before the same
//!   ascending-order rule picks the winner. Selection never races on
//!   completion order, so concurrency cannot change the result.
//! - **Adaptive bisection**: narrows [-100, 0] dB toward the boundary
//!   between "everything kept" and "everything dropped". Inherently
//!   sequential.
//!
//! Exhausting all candidates is `NoValidThreshold`, surfaced to the
//! caller; the engine never silently falls back to a default.

use tracing::{debug, warn};

use crate::analysis::energy::decisions_from_scores;
use crate::error::{Result, TacetError};
use crate::segment::{compute_stats, KeepInterval, SegmentMerger};

/// Default candidate thresholds in dBFS, scanned in this (ascending) order.
pub const PRESET_THRESHOLDS_DBFS: [f32; 13] = [
    -90.0, -80.0, -70.0, -60.0, -50.0, -45.0, -40.0, -35.0, -30.0, -25.0, -20.0, -15.0, -10.0,
];

/// A segmentation must keep more than this fraction of the input...
const MIN_KEEP_RATIO: f64 = 0.5;
/// ...and less than this fraction, to count as valid.
const MAX_KEEP_RATIO: f64 = 0.99;

const ADAPTIVE_FLOOR_DBFS: f32 = -100.0;
const ADAPTIVE_CEIL_DBFS: f32 = 0.0;
const ADAPTIVE_MIN_STEP_DB: f32 = 0.5;
const ADAPTIVE_MAX_ATTEMPTS: usize = 40;

/// How candidate thresholds are generated.
#[derive(Debug, Clone)]
pub enum SearchStrategy {
    /// Try a fixed list in order. The default list is
    /// `PRESET_THRESHOLDS_DBFS`; callers may supply their own.
    Preset(Vec<f32>),
    /// Bisect the dBFS range toward a valid segmentation.
    Adaptive,
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Preset(PRESET_THRESHOLDS_DBFS.to_vec())
    }
}

/// The accepted candidate and the segmentation it produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub threshold_dbfs: f32,
    pub intervals: Vec<KeepInterval>,
}

/// Outcome of evaluating one transient candidate.
enum Candidate {
    Valid(Vec<KeepInterval>),
    /// Nothing (or too little) survived: threshold too strict.
    TooLittleKept,
    /// Nearly everything survived: threshold too lax.
    TooMuchKept,
}

/// Searches candidate dBFS thresholds for a valid segmentation.
pub struct ThresholdSearch {
    strategy: SearchStrategy,
    parallel: bool,
    workers: usize,
}

impl ThresholdSearch {
    pub fn new(strategy: SearchStrategy, parallel: bool, workers: usize) -> Self {
        Self {
            strategy,
            parallel,
            workers: workers.max(1),
        }
    }

    /// Run the search over one shared score buffer.
    ///
    /// # Errors
    /// `TacetError::NoValidThreshold` when every candidate is rejected.
    pub fn run(
        &self,
        scores: &[f32],
        merger: &SegmentMerger,
        total_ms: u64,
    ) -> Result<SearchOutcome> {
        match &self.strategy {
            SearchStrategy::Preset(candidates) => {
                if candidates.is_empty() {
                    return Err(TacetError::NoValidThreshold);
                }
                if self.parallel && self.workers > 1 && candidates.len() > 1 {
                    self.run_preset_parallel(candidates, scores, merger, total_ms)
                } else {
                    run_preset_sequential(candidates, scores, merger, total_ms)
                }
            }
            SearchStrategy::Adaptive => run_adaptive(scores, merger, total_ms),
        }
    }

    /// Evaluate every preset concurrently, then select in scan order.
    fn run_preset_parallel(
        &self,
        candidates: &[f32],
        scores: &[f32],
        merger: &SegmentMerger,
        total_ms: u64,
    ) -> Result<SearchOutcome> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, f32)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Candidate)>();

        for (idx, &threshold) in candidates.iter().enumerate() {
            // Unbounded channel with all receivers alive: send cannot fail.
            let _ = job_tx.send((idx, threshold));
        }
        drop(job_tx);

        let workers = self.workers.min(candidates.len());
        let mut outcomes: Vec<Option<Candidate>> = Vec::new();
        outcomes.resize_with(candidates.len(), || None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok((idx, threshold)) = job_rx.recv() {
                        let candidate = evaluate(threshold, scores, merger, total_ms);
                        let _ = result_tx.send((idx, candidate));
                    }
                });
            }
            drop(result_tx);

            while let Ok((idx, candidate)) = result_rx.recv() {
                outcomes[idx] = Some(candidate);
            }
        });

        // Collect-then-select: identical to the sequential scan order.
        for (idx, outcome) in outcomes.into_iter().enumerate() {
            if let Some(Candidate::Valid(intervals)) = outcome {
                let threshold_dbfs = candidates[idx];
                debug!(threshold_dbfs, "parallel search accepted candidate");
                return Ok(SearchOutcome {
                    threshold_dbfs,
                    intervals,
                });
            }
        }

        warn!(
            candidates = candidates.len(),
            "parallel search rejected every candidate"
        );
        Err(TacetError::NoValidThreshold)
    }
}

fn run_preset_sequential(
    candidates: &[f32],
    scores: &[f32],
    merger: &SegmentMerger,
    total_ms: u64,
) -> Result<SearchOutcome> {
    for &threshold in candidates {
        match evaluate(threshold, scores, merger, total_ms) {
            Candidate::Valid(intervals) => {
                debug!(threshold_dbfs = threshold, "search accepted candidate");
                return Ok(SearchOutcome {
                    threshold_dbfs: threshold,
                    intervals,
                });
            }
            Candidate::TooLittleKept => {
                debug!(threshold_dbfs = threshold, "candidate kept too little")
            }
            Candidate::TooMuchKept => {
                debug!(threshold_dbfs = threshold, "candidate kept too much")
            }
        }
    }

    warn!(
        candidates = candidates.len(),
        "search rejected every candidate"
    );
    Err(TacetError::NoValidThreshold)
}

/// Bisection between "all kept" (low thresholds) and "all dropped" (high).
fn run_adaptive(scores: &[f32], merger: &SegmentMerger, total_ms: u64) -> Result<SearchOutcome> {
    let mut lo = ADAPTIVE_FLOOR_DBFS;
    let mut hi = ADAPTIVE_CEIL_DBFS;

    for attempt in 0..ADAPTIVE_MAX_ATTEMPTS {
        if hi - lo <= ADAPTIVE_MIN_STEP_DB {
            break;
        }
        // One decimal keeps candidates reproducible across platforms.
        let mid = (((lo + hi) / 2.0) * 10.0).round() / 10.0;

        match evaluate(mid, scores, merger, total_ms) {
            Candidate::Valid(intervals) => {
                debug!(threshold_dbfs = mid, attempt, "adaptive search converged");
                return Ok(SearchOutcome {
                    threshold_dbfs: mid,
                    intervals,
                });
            }
            // Too much kept: the threshold is too lax, search upward.
            Candidate::TooMuchKept => lo = mid,
            // Too little kept: too strict, search downward.
            Candidate::TooLittleKept => hi = mid,
        }
    }

    warn!("adaptive search exhausted its range without a valid candidate");
    Err(TacetError::NoValidThreshold)
}

fn evaluate(
    threshold_dbfs: f32,
    scores: &[f32],
    merger: &SegmentMerger,
    total_ms: u64,
) -> Candidate {
    let decisions = decisions_from_scores(scores, threshold_dbfs);
    let intervals = merger.merge(&decisions);
    if intervals.is_empty() {
        return Candidate::TooLittleKept;
    }

    let ratio = compute_stats(&intervals, total_ms).keep_ratio;
    if ratio <= MIN_KEEP_RATIO {
        Candidate::TooLittleKept
    } else if ratio >= MAX_KEEP_RATIO {
        Candidate::TooMuchKept
    } else {
        Candidate::Valid(intervals)
    }
}
