use std::time::Duration;

use serde::Deserialize;

/// Crate-level constants
pub const APP_NAME: &str = "Inklift";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,inklift=debug".to_string()
}

/// Heuristic thresholds used across the pipeline.
///
/// These are tuned against photographed GCSE-style worksheets; they are
/// deliberately named constants rather than inline literals so each stage
/// documents what it is comparing against.
pub mod thresholds {
    /// Minimum bigram Dice similarity for a recognized line to count as
    /// part of the printed question transcript.
    pub const TRANSCRIPT_MATCH: f64 = 0.80;

    /// Same-row vertical overlap fraction under the primary strategy
    /// (coherent per-line output).
    pub const SAME_ROW_OVERLAP_PRIMARY: f64 = 0.30;

    /// Same-row vertical overlap fraction under the fallback strategy.
    /// Fragmented, cluster-based detections drift vertically more and need
    /// a looser tolerance.
    pub const SAME_ROW_OVERLAP_FALLBACK: f64 = 0.10;

    /// Fraction of image height treated as top/bottom margin noise.
    pub const MARGIN_VERTICAL: f64 = 0.05;

    /// Fraction of image width treated as right-edge margin noise.
    pub const MARGIN_RIGHT: f64 = 0.10;

    /// Fragments at or above this confidence keep their fast-path text on
    /// the fallback path instead of being re-recognized.
    pub const FAST_PATH_CONFIDENCE: f64 = 0.90;

    /// Minimum (intersection area / line area) for a line to be tagged as
    /// handwritten. Normalized by the line's own area because handwriting
    /// regions are typically much coarser than individual lines.
    pub const HANDWRITING_OVERLAP: f64 = 0.30;
}

/// Tunable pipeline parameters.
///
/// Serde-deserializable so callers can load overrides from a config file;
/// `Default` gives the production values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-request timeout for every backend call, in seconds.
    pub request_timeout_secs: u64,
    /// Delay between successive fallback re-recognition calls, in
    /// milliseconds. The math backend enforces a request-rate limit.
    pub recognizer_delay_ms: u64,
    /// Padding added around a fragment's box before cropping, in pixels.
    pub crop_padding_px: u32,
    /// Clustering epsilon forwarded to the layout backend's robust call.
    pub cluster_eps: f64,
    /// Minimum cluster size forwarded to the layout backend's robust call.
    pub cluster_min_pts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            recognizer_delay_ms: 200,
            crop_padding_px: 12,
            cluster_eps: 40.0,
            cluster_min_pts: 1,
        }
    }
}

impl PipelineConfig {
    /// Inter-call delay as a `Duration`.
    pub fn recognizer_delay(&self) -> Duration {
        Duration::from_millis(self.recognizer_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_rate_limit_delay() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.recognizer_delay(), Duration::from_millis(200));
    }

    #[test]
    fn config_deserializes_partial_overrides() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"recognizer_delay_ms": 50}"#).unwrap();
        assert_eq!(cfg.recognizer_delay_ms, 50);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.request_timeout_secs, 30);
    }

    #[test]
    fn threshold_constants_are_sane() {
        assert!(thresholds::SAME_ROW_OVERLAP_FALLBACK < thresholds::SAME_ROW_OVERLAP_PRIMARY);
        assert!(thresholds::TRANSCRIPT_MATCH > 0.5 && thresholds::TRANSCRIPT_MATCH <= 1.0);
        assert!(thresholds::MARGIN_VERTICAL < thresholds::MARGIN_RIGHT);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
