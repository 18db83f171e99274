//! Identity-preserving image style-transfer inference worker
//!
//! Accepts a source image, a text prompt, and a named style; returns a
//! generated image that keeps the subject's identity while applying the
//! style. The interesting part is the orchestration layer: one accelerator,
//! mutually exclusive heavyweight engines and style modifiers, request-
//! triggered swapping, a single-worker execution slot, and precise failure
//! propagation.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod resource;

pub use error::{AppError, Result};

use std::sync::Arc;

use engine::EngineRuntime;
use pipeline::{GenerationWorker, ImageFetcher};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: config::Settings,
    pub runtime: Arc<dyn EngineRuntime>,
    pub fetcher: ImageFetcher,
    pub worker: GenerationWorker,
}
