//! Fusing frame decisions into the final list of retained intervals.
//!
//! ## Passes
//!
//! ```text
//! 1. Scan:  FrameDecision sequence → maximal voiced runs (RawInterval)
//! 2. Merge: fuse runs separated by silence shorter than min_silence_ms
//!           (the short gap is retained, short pauses stay part of speech)
//! 3. Split: any fused interval longer than max_segment_ms is cut at the
//!           internal silent run nearest its midpoint, recursively
//! ```
//!
//! Cutting removes the chosen silent run entirely: the left interval ends
//! where the run starts, the right one begins where it ends. With no
//! internal silence the cut lands on the max_segment_ms boundary itself.
//! Tie-break for equidistant runs: prefer the longer, then the earlier.
//! The whole pipeline is deterministic; re-merging its own output changes
//! nothing.

use serde::{Deserialize, Serialize};

use crate::analysis::FrameDecision;
use crate::error::{Result, TacetError};

/// Timing rules applied when fusing voiced runs into keep intervals.
///
/// Supplied once per invocation and never mutated mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePolicy {
    /// Silent gaps at least this long (ms) separate keep intervals;
    /// shorter gaps are fused into the surrounding speech.
    pub min_silence_ms: u64,
    /// No keep interval may exceed this duration (ms).
    pub max_segment_ms: u64,
    /// Speech-probability threshold for VAD mode, in [0, 1].
    pub vad_threshold: f32,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            min_silence_ms: 1000,
            max_segment_ms: 5000,
            vad_threshold: 0.5,
        }
    }
}

impl MergePolicy {
    /// Validate once at configuration time, before any decoding.
    ///
    /// # Errors
    /// `TacetError::InvalidPolicy` on any out-of-range field. A bad policy
    /// is a caller bug and always fatal for the invocation.
    pub fn validate(&self) -> Result<()> {
        if self.min_silence_ms == 0 {
            return Err(TacetError::InvalidPolicy(
                "minSilenceMs must be positive".into(),
            ));
        }
        if self.max_segment_ms < self.min_silence_ms {
            return Err(TacetError::InvalidPolicy(format!(
                "maxSegmentMs ({}) must not be below minSilenceMs ({})",
                self.max_segment_ms, self.min_silence_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(TacetError::InvalidPolicy(format!(
                "vadThreshold ({}) must be within [0, 1]",
                self.vad_threshold
            )));
        }
        Ok(())
    }

    pub fn with_min_silence_ms(mut self, ms: u64) -> Self {
        self.min_silence_ms = ms;
        self
    }

    pub fn with_max_segment_ms(mut self, ms: u64) -> Self {
        self.max_segment_ms = ms;
        self
    }

    pub fn with_vad_threshold(mut self, threshold: f32) -> Self {
        self.vad_threshold = threshold;
        self
    }
}

/// A maximal contiguous voiced run, in frame indices (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInterval {
    pub start_frame: usize,
    pub end_frame: usize,
}

/// A retained time range of the original audio, in milliseconds
/// (end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepInterval {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl KeepInterval {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// A fused run awaiting the split pass. `gaps` remembers the silent runs
/// swallowed by the merge pass; the split pass cuts at one of them.
struct FusedRun {
    start: usize,
    end: usize,
    gaps: Vec<(usize, usize)>,
}

/// Converts an ordered `FrameDecision` sequence into keep intervals.
pub struct SegmentMerger {
    policy: MergePolicy,
    frame_ms: u64,
}

impl SegmentMerger {
    /// Create a merger for a fixed frame cadence.
    ///
    /// # Errors
    /// `TacetError::InvalidPolicy` if the policy fails validation or
    /// `frame_ms` is zero.
    pub fn new(policy: MergePolicy, frame_ms: u64) -> Result<Self> {
        policy.validate()?;
        if frame_ms == 0 {
            return Err(TacetError::InvalidPolicy(
                "frame duration must be positive".into(),
            ));
        }
        Ok(Self { policy, frame_ms })
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn frame_ms(&self) -> u64 {
        self.frame_ms
    }

    /// One linear scan over the decisions, collecting maximal voiced runs.
    pub fn scan_raw(decisions: &[FrameDecision]) -> Vec<RawInterval> {
        let mut raw = Vec::new();
        let mut run_start: Option<usize> = None;

        for (i, decision) in decisions.iter().enumerate() {
            match (run_start, decision.is_voiced()) {
                (None, true) => run_start = Some(i),
                (Some(start), false) => {
                    raw.push(RawInterval {
                        start_frame: start,
                        end_frame: i,
                    });
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            raw.push(RawInterval {
                start_frame: start,
                end_frame: decisions.len(),
            });
        }

        raw
    }

    /// Produce the final ordered keep intervals for a decision sequence.
    ///
    /// Zero voiced runs yield an empty list; whether that is an error
    /// (`NoSpeechDetected`) or a retry trigger is the caller's call.
    pub fn merge(&self, decisions: &[FrameDecision]) -> Vec<KeepInterval> {
        let raw = Self::scan_raw(decisions);
        if raw.is_empty() {
            return Vec::new();
        }

        // Merge pass: left to right, fuse across sub-threshold gaps.
        let mut fused: Vec<FusedRun> = Vec::new();
        for run in raw {
            match fused.last_mut() {
                Some(cur) => {
                    let gap_frames = run.start_frame - cur.end;
                    if gap_frames as u64 * self.frame_ms < self.policy.min_silence_ms {
                        cur.gaps.push((cur.end, run.start_frame));
                        cur.end = run.end_frame;
                    } else {
                        fused.push(FusedRun {
                            start: run.start_frame,
                            end: run.end_frame,
                            gaps: Vec::new(),
                        });
                    }
                }
                None => fused.push(FusedRun {
                    start: run.start_frame,
                    end: run.end_frame,
                    gaps: Vec::new(),
                }),
            }
        }

        // Split pass.
        let mut out_frames: Vec<(usize, usize)> = Vec::new();
        for run in &fused {
            self.split_run(run.start, run.end, &run.gaps, &mut out_frames);
        }

        out_frames
            .into_iter()
            .map(|(start, end)| KeepInterval {
                start_ms: start as u64 * self.frame_ms,
                end_ms: end as u64 * self.frame_ms,
            })
            .collect()
    }

    /// Recursively cut `[start, end)` until it satisfies max_segment_ms.
    fn split_run(
        &self,
        start: usize,
        end: usize,
        gaps: &[(usize, usize)],
        out: &mut Vec<(usize, usize)>,
    ) {
        let duration_ms = (end - start) as u64 * self.frame_ms;
        if duration_ms <= self.policy.max_segment_ms {
            out.push((start, end));
            return;
        }

        // Candidate nearest the midpoint; ties go to the longer run, then
        // the earlier one. Positions are compared in doubled frame units so
        // midpoints stay integral.
        let mid2 = start + end;
        let mut best: Option<(usize, usize, usize)> = None; // (dist, gap_start, gap_end)
        for &(gap_start, gap_end) in gaps {
            let dist = (gap_start + gap_end).abs_diff(mid2);
            let better = match best {
                None => true,
                Some((best_dist, best_start, best_end)) => {
                    dist < best_dist
                        || (dist == best_dist && gap_end - gap_start > best_end - best_start)
                }
            };
            if better {
                best = Some((dist, gap_start, gap_end));
            }
        }

        match best {
            Some((_, gap_start, gap_end)) => {
                let left: Vec<(usize, usize)> =
                    gaps.iter().copied().filter(|&(_, e)| e <= gap_start).collect();
                let right: Vec<(usize, usize)> =
                    gaps.iter().copied().filter(|&(s, _)| s >= gap_end).collect();
                self.split_run(start, gap_start, &left, out);
                self.split_run(gap_end, end, &right, out);
            }
            None => {
                // No internal silence: cut at the duration boundary itself.
                let max_frames = (self.policy.max_segment_ms / self.frame_ms).max(1) as usize;
                let cut = start + max_frames;
                out.push((start, cut));
                self.split_run(cut, end, &[], out);
            }
        }
    }
}

/// Aggregate statistics over a keep-interval list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    /// Total retained duration in milliseconds.
    pub total_keep_ms: u64,
    /// Total dropped duration in milliseconds.
    pub total_cut_ms: u64,
    /// Number of keep intervals.
    pub keep_count: usize,
    /// Retained fraction of the original duration, in [0, 1].
    pub keep_ratio: f64,
}

/// Compute stats for `intervals` against the original total duration.
pub fn compute_stats(intervals: &[KeepInterval], total_ms: u64) -> SegmentStats {
    let total_keep_ms: u64 = intervals.iter().map(KeepInterval::duration_ms).sum();
    let keep_ratio = if total_ms > 0 {
        total_keep_ms as f64 / total_ms as f64
    } else {
        0.0
    };
    SegmentStats {
        total_keep_ms,
        total_cut_ms: total_ms.saturating_sub(total_keep_ms),
        keep_count: intervals.len(),
        keep_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: u64 = 100;

    fn merger(min_silence_ms: u64, max_segment_ms: u64) -> SegmentMerger {
        let policy = MergePolicy::default()
            .with_min_silence_ms(min_silence_ms)
            .with_max_segment_ms(max_segment_ms);
        SegmentMerger::new(policy, FRAME_MS).unwrap()
    }

    /// Build a decision sequence of `frames` frames with the given voiced
    /// frame ranges (end exclusive).
    fn decisions(frames: usize, voiced: &[(usize, usize)]) -> Vec<FrameDecision> {
        let mut d = vec![FrameDecision::Silent; frames];
        for &(start, end) in voiced {
            for slot in &mut d[start..end] {
                *slot = FrameDecision::Voiced;
            }
        }
        d
    }

    fn intervals(list: &[(u64, u64)]) -> Vec<KeepInterval> {
        list.iter()
            .map(|&(start_ms, end_ms)| KeepInterval { start_ms, end_ms })
            .collect()
    }

    #[test]
    fn policy_rejects_zero_min_silence() {
        let err = MergePolicy::default().with_min_silence_ms(0).validate();
        assert!(matches!(err, Err(TacetError::InvalidPolicy(_))));
    }

    #[test]
    fn policy_rejects_max_below_min() {
        let err = MergePolicy::default()
            .with_min_silence_ms(2000)
            .with_max_segment_ms(1000)
            .validate();
        assert!(matches!(err, Err(TacetError::InvalidPolicy(_))));
    }

    #[test]
    fn policy_rejects_out_of_range_threshold() {
        let err = MergePolicy::default().with_vad_threshold(1.5).validate();
        assert!(matches!(err, Err(TacetError::InvalidPolicy(_))));
    }

    #[test]
    fn scan_finds_ordered_disjoint_runs() {
        let d = decisions(10, &[(1, 3), (5, 6), (8, 10)]);
        let raw = SegmentMerger::scan_raw(&d);
        assert_eq!(
            raw,
            vec![
                RawInterval { start_frame: 1, end_frame: 3 },
                RawInterval { start_frame: 5, end_frame: 6 },
                RawInterval { start_frame: 8, end_frame: 10 },
            ]
        );
    }

    #[test]
    fn gaps_at_or_above_min_silence_stay_separate() {
        // 10 s of audio, voiced [0,2000), [3500,4000), [9000,10000) ms.
        // Gaps of 1500 ms and 5000 ms with minSilence 1000: nothing merges.
        let d = decisions(100, &[(0, 20), (35, 40), (90, 100)]);
        let out = merger(1000, 5000).merge(&d);
        assert_eq!(out, intervals(&[(0, 2000), (3500, 4000), (9000, 10000)]));
    }

    #[test]
    fn sub_threshold_gap_is_fused_and_retained() {
        // Same layout with minSilence 2000: the 1500 ms gap fuses the first
        // two runs into [0,4000); the 5000 ms gap still separates.
        let d = decisions(100, &[(0, 20), (35, 40), (90, 100)]);
        let out = merger(2000, 5000).merge(&d);
        assert_eq!(out, intervals(&[(0, 4000), (9000, 10000)]));
    }

    #[test]
    fn short_pause_becomes_part_of_speech() {
        let d = decisions(20, &[(0, 10), (15, 20)]);
        let out = merger(1000, 5000).merge(&d);
        assert_eq!(out, intervals(&[(0, 2000)]));
    }

    #[test]
    fn over_long_interval_splits_at_gap_nearest_midpoint() {
        // Voiced [0,3900) and [4100,8000) ms; the 200 ms gap fuses into one
        // [0,8000) interval that exceeds maxSegment 5000 and is cut back
        // apart at the swallowed gap (center 4000 == midpoint).
        let d = decisions(80, &[(0, 39), (41, 80)]);
        let out = merger(1000, 5000).merge(&d);
        assert_eq!(out, intervals(&[(0, 3900), (4100, 8000)]));
        assert!(out.iter().all(|k| k.duration_ms() <= 5000));
    }

    #[test]
    fn no_internal_silence_cuts_at_duration_boundary() {
        let d = decisions(120, &[(0, 120)]);
        let out = merger(1000, 5000).merge(&d);
        assert_eq!(out, intervals(&[(0, 5000), (5000, 10000), (10000, 12000)]));
    }

    #[test]
    fn equidistant_gaps_prefer_the_longer() {
        // Midpoint of [0,10000) is 5000. Gap A [2000,2600) and gap B
        // [7200,8200) have centers equidistant from it (2300 vs 7700);
        // B is longer and wins the first cut.
        let d = decisions(100, &[(0, 20), (26, 72), (82, 100)]);
        let out = merger(1100, 5000).merge(&d);
        assert_eq!(
            out,
            intervals(&[(0, 2000), (2600, 7200), (8200, 10000)])
        );
    }

    #[test]
    fn fully_tied_gaps_prefer_the_earlier() {
        // Gaps [2000,2600) and [7400,8000): equidistant centers, equal
        // length, so the earlier one takes the first cut.
        let d = decisions(100, &[(0, 20), (26, 74), (80, 100)]);
        let out = merger(1100, 5000).merge(&d);
        assert_eq!(
            out,
            intervals(&[(0, 2000), (2600, 7400), (8000, 10000)])
        );
    }

    #[test]
    fn all_silent_yields_empty_list() {
        let d = decisions(50, &[]);
        let out = merger(1000, 5000).merge(&d);
        assert!(out.is_empty());
    }

    #[test]
    fn merge_is_idempotent_on_induced_decisions() {
        let cases: Vec<Vec<FrameDecision>> = vec![
            decisions(80, &[(0, 39), (41, 80)]),
            decisions(120, &[(0, 120)]),
            decisions(100, &[(0, 20), (35, 40), (90, 100)]),
            decisions(100, &[(0, 20), (26, 72), (82, 100)]),
        ];
        for d in cases {
            let m = merger(1000, 5000);
            let first = m.merge(&d);

            // Induce: voiced exactly inside the produced intervals.
            let induced: Vec<FrameDecision> = (0..d.len())
                .map(|i| {
                    let t = i as u64 * FRAME_MS;
                    if first.iter().any(|k| t >= k.start_ms && t < k.end_ms) {
                        FrameDecision::Voiced
                    } else {
                        FrameDecision::Silent
                    }
                })
                .collect();

            let second = m.merge(&induced);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn invariants_hold_for_generated_patterns() {
        // Deterministic xorshift so failures reproduce.
        let mut state = 0x2545f491u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for _ in 0..50 {
            let frames = 40 + (next() % 200) as usize;
            let d: Vec<FrameDecision> = (0..frames)
                .map(|_| {
                    if next() % 3 == 0 {
                        FrameDecision::Silent
                    } else {
                        FrameDecision::Voiced
                    }
                })
                .collect();

            let m = merger(700, 3000);
            let out = m.merge(&d);

            for pair in out.windows(2) {
                assert!(pair[0].end_ms <= pair[1].start_ms, "overlap or disorder");
            }
            for k in &out {
                assert!(k.duration_ms() <= 3000, "interval exceeds max duration");
            }
        }
    }

    #[test]
    fn merge_pass_separates_intervals_by_min_silence() {
        // Large max so no splits happen; every surviving gap must then be
        // at least minSilence wide.
        let mut state = 0x9e3779b9u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for _ in 0..50 {
            let frames = 40 + (next() % 200) as usize;
            let d: Vec<FrameDecision> = (0..frames)
                .map(|_| {
                    if next() % 2 == 0 {
                        FrameDecision::Silent
                    } else {
                        FrameDecision::Voiced
                    }
                })
                .collect();

            let policy = MergePolicy::default()
                .with_min_silence_ms(900)
                .with_max_segment_ms(1_000_000);
            let m = SegmentMerger::new(policy, FRAME_MS).unwrap();
            let out = m.merge(&d);

            for pair in out.windows(2) {
                assert!(
                    pair[1].start_ms - pair[0].end_ms >= 900,
                    "gap below min silence survived the merge pass"
                );
            }
        }
    }

    #[test]
    fn stats_account_for_kept_and_cut_time() {
        let list = intervals(&[(0, 1000), (2000, 3000)]);
        let stats = compute_stats(&list, 4000);
        assert_eq!(stats.total_keep_ms, 2000);
        assert_eq!(stats.total_cut_ms, 2000);
        assert_eq!(stats.keep_count, 2);
        assert!((stats.keep_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn keep_interval_serializes_camel_case() {
        let json = serde_json::to_value(KeepInterval {
            start_ms: 10,
            end_ms: 20,
        })
        .unwrap();
        assert_eq!(json["startMs"], 10);
        assert_eq!(json["endMs"], 20);
    }
}
