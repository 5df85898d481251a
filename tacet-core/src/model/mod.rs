//! VAD model abstraction.
//!
//! The `VadModel` trait is the extensibility point for acoustic models:
//! any component exposing per-frame speech probabilities can drive the
//! pipeline, without coupling the engine to one inference library.
//!
//! `&mut self` on `infer` intentionally expresses that models are stateful
//! (RNN hidden state across frames). All mutation is serialised through
//! `ModelHandle`'s `parking_lot::Mutex`; the handle exists so an expensive
//! model is initialised once per process and shared across files, never
//! rebuilt per frame.

#[cfg(feature = "silero")]
pub mod silero;

#[cfg(feature = "silero")]
pub use silero::SileroVad;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Contract for voice-activity models.
pub trait VadModel: Send + 'static {
    /// Sample rate (Hz) the model expects its frames at.
    fn sample_rate(&self) -> u32;

    /// Fixed frame size in samples. Frames of any other length are
    /// rejected by `infer`.
    fn frame_size(&self) -> usize;

    /// Score one frame, returning a speech probability in [0.0, 1.0].
    ///
    /// # Errors
    /// `TacetError::ModelInference` if the frame has the wrong shape or
    /// the backend fails. Inference errors are fatal for the current file
    /// and are never retried.
    fn infer(&mut self, frame: &[f32]) -> Result<f32>;

    /// Reset internal state (e.g. hidden states) between audio streams.
    fn reset(&mut self);
}

/// Thread-safe reference-counted handle to any `VadModel` implementor.
///
/// Uses `parking_lot::Mutex` for non-poisoning behaviour on panic and a
/// faster uncontended lock than `std::sync::Mutex`.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn VadModel>>);

impl ModelHandle {
    /// Wrap any `VadModel` in a `ModelHandle`.
    pub fn new<M: VadModel>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}
