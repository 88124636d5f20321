use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RecognitionError;
use crate::config::thresholds;

/// Axis-aligned rectangle in pixel space, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// All fields finite, width and height strictly positive.
    /// Rects failing this are dropped at the point of discovery and
    /// never propagated downstream.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Area of overlap with `other`, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let h = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        if w > 0.0 && h > 0.0 {
            w * h
        } else {
            0.0
        }
    }

    /// Stable signature for crop deduplication on the fallback path.
    /// Rounded to whole pixels: fragments that would produce the same
    /// crop should not trigger a second recognizer call.
    pub fn crop_signature(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.x.round(),
            self.y.round(),
            self.width.round(),
            self.height.round()
        )
    }
}

/// Page dimensions, used to express margin thresholds as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: f64,
    pub height: f64,
}

/// Which backend produced a line's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceBackend {
    Math,
    Vision,
}

/// One recognized line of page content.
///
/// Created by the orchestrator from backend output, then flows through
/// the pipeline stages as a value: split 1→N or removed by the
/// post-processor, annotated by the handwriting correlator, reordered by
/// the sorter, and projected into [`StudentWorkStep`] by the assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub region: Rect,
    /// Backend confidence in [0, 1]. May be overlaid once when the
    /// fallback path re-recognizes the region.
    pub confidence: f64,
    pub source: SourceBackend,
    pub is_handwritten: bool,
    /// Set when a fallback-path region was confirmed by math
    /// re-recognition; such lines bypass the inclusion filter.
    pub filter_exempt: bool,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, region: Rect, confidence: f64, source: SourceBackend) -> Self {
        Self {
            text: text.into(),
            region,
            confidence,
            source,
            is_handwritten: false,
            filter_exempt: false,
        }
    }
}

/// One ordered step of the student's own working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentWorkStep {
    /// Sequential id (`step_1`, `step_2`, …) assigned after final
    /// ordering. Not stable across reprocessing.
    pub id: String,
    pub text: String,
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// Location entry in the step lookup table, for downstream
/// re-localization (e.g. drawing marks back onto the photo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLocation {
    pub bbox: [f64; 4],
    pub text: String,
}

/// Final pipeline output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub steps: Vec<StudentWorkStep>,
    pub lookup: HashMap<String, StepLocation>,
    pub outcome: StrategyOutcome,
}

/// Diagnostics describing how the result was obtained.
///
/// Consumed by logging and billing only — never by correctness-critical
/// logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub used_fallback: bool,
    pub recognizer_calls: u32,
    /// Number of raw lines/fragments received from the backends before
    /// any filtering.
    pub raw_blocks: usize,
}

/// Caller hint about which strategy to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyHint {
    /// Default: try the math backend on the whole page first.
    #[default]
    MathFirst,
    /// Skip the primary math call, e.g. for pages known to be
    /// prose-heavy.
    LayoutOnly,
}

/// Which strategy produced the working line set.
///
/// Passed down the stage chain instead of threading ad hoc fallback
/// flags through every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyContext {
    pub used_fallback: bool,
}

impl StrategyContext {
    /// Adaptive same-row vertical overlap threshold for the sorter.
    pub fn same_row_threshold(&self) -> f64 {
        if self.used_fallback {
            thresholds::SAME_ROW_OVERLAP_FALLBACK
        } else {
            thresholds::SAME_ROW_OVERLAP_PRIMARY
        }
    }
}

// ──────────────────────────────────────────────
// Collaborator contracts
// ──────────────────────────────────────────────

/// Options forwarded to the math recognizer.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizeOptions {
    pub include_line_data: bool,
    pub formats: Vec<String>,
    pub disable_array_detection: bool,
}

impl RecognizeOptions {
    /// Whole-page call: per-line region data, arrays left intact so the
    /// post-processor can split merged rows itself.
    pub fn full_page() -> Self {
        Self {
            include_line_data: true,
            formats: vec!["text".to_string()],
            disable_array_detection: false,
        }
    }

    /// Cropped-region call: a single fragment, no line data needed.
    pub fn region() -> Self {
        Self {
            include_line_data: false,
            formats: vec!["text".to_string()],
            disable_array_detection: true,
        }
    }
}

/// One line from the math recognizer. Geometry is kept raw because the
/// backend aliases its box fields across API versions; the bbox
/// normalizer owns shape handling.
#[derive(Debug, Clone, Deserialize)]
pub struct MathLine {
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "latexText")]
    pub latex_text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub geometry: Value,
}

/// Envelope returned by the math recognizer.
///
/// Whole-page calls populate `lines`; cropped-region calls carry the
/// single result in the top-level `text`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MathRecognition {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub lines: Vec<MathLine>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Math-aware recognition backend.
pub trait MathRecognizer {
    fn recognize(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
    ) -> Result<MathRecognition, RecognitionError>;
}

/// One fragment from the layout recognizer's robust multi-pass call.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutFragment {
    pub text: String,
    pub geometry: FragmentGeometry,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FragmentGeometry {
    #[serde(alias = "minX")]
    pub min_x: f64,
    #[serde(alias = "minY")]
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

impl FragmentGeometry {
    pub fn to_rect(self) -> Rect {
        Rect::new(self.min_x, self.min_y, self.width, self.height)
    }
}

/// General-purpose layout recognition backend.
pub trait LayoutRecognizer {
    /// Robust multi-pass layout call. Opaque to the pipeline: the
    /// backend merges three recognition passes and clusters nearby
    /// fragments itself.
    fn robust_recognize(
        &self,
        image: &[u8],
        cluster_eps: f64,
        cluster_min_pts: u32,
    ) -> Result<Vec<LayoutFragment>, RecognitionError>;

    /// Independent handwriting-region detector.
    fn detect_handwriting(&self, image: &[u8]) -> Result<Vec<Rect>, RecognitionError>;

    fn image_dimensions(&self, image: &[u8]) -> Result<ImageDimensions, RecognitionError>;
}

/// Crop provider for fallback-path region re-recognition.
pub trait RegionCropper {
    fn crop(&self, image: &[u8], rect: &Rect) -> Result<Vec<u8>, RecognitionError>;
}

/// Verdict from the math-likeness classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathLikeness {
    /// Higher means more likely to be mathematical working.
    pub score: f64,
    /// The fast-path text looks unreliable and re-recognition is worth
    /// prioritizing.
    pub suspicious: bool,
}

/// External classifier deciding which fragments look like maths.
pub trait MathLikenessClassifier {
    fn classify(&self, text: &str) -> MathLikeness;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_rect() {
        assert!(Rect::new(0.0, 0.0, 10.0, 5.0).is_valid());
    }

    #[test]
    fn zero_size_rect_invalid() {
        assert!(!Rect::new(0.0, 0.0, 0.0, 5.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, 10.0, 0.0).is_valid());
    }

    #[test]
    fn non_finite_rect_invalid() {
        assert!(!Rect::new(f64::NAN, 0.0, 10.0, 5.0).is_valid());
        assert!(!Rect::new(0.0, f64::INFINITY, 10.0, 5.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, f64::NEG_INFINITY, 5.0).is_valid());
    }

    #[test]
    fn intersection_of_overlapping_rects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!((a.intersection_area(&b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn intersection_of_disjoint_rects_is_zero() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.intersection_area(&b), 0.0);
    }

    #[test]
    fn crop_signature_rounds_to_pixels() {
        let a = Rect::new(10.2, 20.4, 100.1, 50.4);
        let b = Rect::new(10.4, 19.6, 99.8, 50.1);
        assert_eq!(a.crop_signature(), b.crop_signature());
    }

    #[test]
    fn context_threshold_relaxes_under_fallback() {
        let primary = StrategyContext { used_fallback: false };
        let fallback = StrategyContext { used_fallback: true };
        assert!(fallback.same_row_threshold() < primary.same_row_threshold());
    }

    #[test]
    fn math_recognition_parses_lenient_envelope() {
        // Older API versions omit `confidence` and use camelCase latex.
        let raw = r#"{
            "lines": [
                {"text": "2x + 3 = 9", "latexText": "2x+3=9",
                 "region": {"top_left_x": 10, "top_left_y": 20, "width": 200, "height": 30}}
            ]
        }"#;
        let parsed: MathRecognition = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.lines.len(), 1);
        assert_eq!(parsed.lines[0].latex_text.as_deref(), Some("2x+3=9"));
        assert!(parsed.lines[0].confidence.is_none());
        assert!(parsed.lines[0].geometry.get("region").is_some());
    }

    #[test]
    fn fragment_geometry_accepts_camel_case() {
        let raw = r#"{"minX": 5, "minY": 10, "width": 50, "height": 20}"#;
        let geom: FragmentGeometry = serde_json::from_str(raw).unwrap();
        let rect = geom.to_rect();
        assert_eq!(rect.x, 5.0);
        assert_eq!(rect.y, 10.0);
    }
}
