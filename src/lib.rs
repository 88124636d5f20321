pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::orchestrator::{HeuristicMathClassifier, RecognitionPipeline};
pub use pipeline::types::{
    PipelineResult, RecognizedLine, Rect, StrategyHint, StrategyOutcome, StudentWorkStep,
};
pub use pipeline::RecognitionError;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries and integration tests.
///
/// Respects `RUST_LOG` when set, otherwise falls back to the crate
/// default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
