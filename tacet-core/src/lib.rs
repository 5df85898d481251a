//! # tacet-core
//!
//! Silence detection and removal engine.
//!
//! ## Architecture
//!
//! ```text
//! decode(path) → Waveform ──► EnergyAnalyzer ─┐
//!                         └─► VoiceActivityAdapter ─┤
//!                                                   ▼
//!                                      FrameDecision sequence
//!                                                   │
//!                                            SegmentMerger
//!                                                   │
//!                                             KeepIntervals ──► encode(path)
//! ```
//!
//! Energy mode wraps the merger in a `ThresholdSearch` that tries dBFS
//! candidates until one yields a valid segmentation; VAD mode thresholds
//! model probabilities directly. The `Coordinator` picks the pipeline per
//! invocation and `BatchOrchestrator` runs it over directories, with a
//! worker pool where the mode permits one.
//!
//! The engine is offline and synchronous: it operates on fully decoded
//! waveforms, and decode/encode/inference are blocking calls.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod engine;
pub mod error;
pub mod model;
pub mod report;
pub mod search;
pub mod segment;

// Convenience re-exports for downstream crates
pub use engine::batch::{BatchJob, BatchOrchestrator};
pub use engine::{Coordinator, EngineConfig, ResolvedConfig};
pub use error::TacetError;
pub use model::{ModelHandle, VadModel};
pub use report::{BatchReport, DetectionMode, FileOutcome, ProcessingResult};
pub use segment::{KeepInterval, MergePolicy, SegmentStats};

#[cfg(feature = "silero")]
pub use model::SileroVad;
