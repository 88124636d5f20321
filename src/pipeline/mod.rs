pub mod assemble;
pub mod backends;
pub mod bbox;
pub mod boundary;
pub mod crop;
pub mod handwriting;
pub mod orchestrator;
pub mod postprocess;
pub mod reading_order;
pub mod types;

pub use orchestrator::{HeuristicMathClassifier, RecognitionPipeline};
pub use types::*;

use thiserror::Error;

/// Failure taxonomy for the recognition pipeline.
///
/// Only `TotalFailure` ever reaches the caller of
/// [`RecognitionPipeline::process`]: backend and geometry failures are
/// handled internally by falling back, degrading, or dropping lines.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Backend unreachable, timed out, or returned a malformed envelope.
    #[error("recognition backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend answered successfully but produced zero usable lines.
    #[error("recognition succeeded but returned no usable lines")]
    NoUsableData,

    /// A line's bounding box could not be normalized to a valid rect.
    #[error("invalid geometry: {0}")]
    GeometryInvalid(String),

    /// Both the primary and the fallback strategy produced zero lines.
    #[error("both recognition strategies were exhausted without producing any lines")]
    TotalFailure,

    /// Image decode/crop failed (fallback path, per-region).
    #[error("image processing error: {0}")]
    ImageProcessing(String),
}
