//! Recognition orchestrator: the single entry point of the pipeline.
//!
//! Runs the primary math strategy (whole page, per-line data) and, when
//! it fails or returns nothing usable, the fallback layout strategy
//! (robust fragments, selective re-recognition of cropped regions).
//! The handwriting detector runs concurrently with whichever strategy
//! is active; its failure degrades tagging, never the result.
//!
//! Backend and geometry failures are absorbed along the way. The only
//! error a caller ever sees is `TotalFailure`, raised when both
//! strategies are exhausted with zero lines.

use std::collections::HashSet;
use std::thread;

use tracing::{debug, info, info_span, warn};

use crate::config::{thresholds, PipelineConfig};

use super::types::{
    ImageDimensions, LayoutRecognizer, MathLikeness, MathLikenessClassifier, MathRecognizer,
    PipelineResult, RecognizeOptions, RecognizedLine, Rect, RegionCropper, SourceBackend,
    StrategyContext, StrategyHint, StrategyOutcome,
};
use super::{assemble, bbox, boundary, handwriting, postprocess, reading_order, RecognitionError};

/// Hybrid recognition pipeline over a math backend and a layout backend.
///
/// Collaborators are trait objects so tests can script backend behavior
/// without a network.
pub struct RecognitionPipeline {
    math: Box<dyn MathRecognizer + Send + Sync>,
    vision: Box<dyn LayoutRecognizer + Send + Sync>,
    cropper: Box<dyn RegionCropper + Send + Sync>,
    classifier: Box<dyn MathLikenessClassifier + Send + Sync>,
    config: PipelineConfig,
}

impl RecognitionPipeline {
    pub fn new(
        math: Box<dyn MathRecognizer + Send + Sync>,
        vision: Box<dyn LayoutRecognizer + Send + Sync>,
        cropper: Box<dyn RegionCropper + Send + Sync>,
        classifier: Box<dyn MathLikenessClassifier + Send + Sync>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            math,
            vision,
            cropper,
            classifier,
            config,
        }
    }

    /// Process one photographed page.
    ///
    /// `transcript` is the printed question text when the caller knows
    /// it; it drives the question/work boundary. Without it every
    /// recognized line is kept.
    pub fn process(
        &self,
        image: &[u8],
        transcript: Option<&str>,
        hint: StrategyHint,
    ) -> Result<PipelineResult, RecognitionError> {
        let span = info_span!("recognize_page", ?hint);
        let _guard = span.enter();

        thread::scope(|scope| {
            // Handwriting detection is independent of strategy choice,
            // so it overlaps with the recognition calls.
            let handwriting_handle = scope.spawn(|| self.vision.detect_handwriting(image));

            let mut recognizer_calls: u32 = 0;
            let mut raw_blocks: usize = 0;
            let mut dims: Option<ImageDimensions> = None;

            let primary = match hint {
                StrategyHint::LayoutOnly => {
                    debug!("skipping primary strategy on caller hint");
                    None
                }
                StrategyHint::MathFirst => {
                    recognizer_calls += 1;
                    match self.primary_lines(image, &mut raw_blocks) {
                        Ok(lines) => Some(lines),
                        Err(e) => {
                            info!(error = %e, "primary strategy failed, falling back");
                            None
                        }
                    }
                }
            };

            let (lines, used_fallback) = match primary {
                Some(lines) => (lines, false),
                None => match self.fallback_lines(image, &mut recognizer_calls, &mut raw_blocks)
                {
                    Ok((lines, d)) if !lines.is_empty() => {
                        dims = Some(d);
                        (lines, true)
                    }
                    Ok(_) => {
                        warn!("fallback strategy produced zero lines");
                        return Err(RecognitionError::TotalFailure);
                    }
                    Err(e) => {
                        warn!(error = %e, "fallback strategy failed");
                        return Err(RecognitionError::TotalFailure);
                    }
                },
            };

            // Everything above the question/work boundary is the printed
            // question, not the student's working.
            let start = boundary::detect_work_start(&lines, transcript);
            if start > 0 {
                debug!(skipped = start, "dropped lines above work boundary");
            }
            let lines: Vec<RecognizedLine> = lines.into_iter().skip(start).collect();

            let lines = postprocess::split_merged_lines(lines);
            let lines = match (used_fallback, dims) {
                (true, Some(d)) => postprocess::filter_work_lines(lines, d),
                _ => lines,
            };

            let regions = match handwriting_handle.join() {
                Ok(Ok(regions)) => regions,
                Ok(Err(e)) => {
                    debug!(error = %e, "handwriting detection unavailable");
                    Vec::new()
                }
                Err(_) => {
                    warn!("handwriting detection thread panicked");
                    Vec::new()
                }
            };
            let lines = handwriting::tag_handwritten(lines, &regions);

            let ctx = StrategyContext { used_fallback };
            let lines = reading_order::sort_reading_order(lines, &ctx);
            let (steps, lookup) = assemble::assemble_steps(&lines);

            info!(
                steps = steps.len(),
                used_fallback,
                recognizer_calls,
                raw_blocks,
                "page processed"
            );
            Ok(PipelineResult {
                steps,
                lookup,
                outcome: StrategyOutcome {
                    used_fallback,
                    recognizer_calls,
                    raw_blocks,
                },
            })
        })
    }

    /// Primary strategy: one whole-page math call with per-line data.
    ///
    /// Lines with empty text or unusable geometry are dropped silently;
    /// zero usable lines is `NoUsableData` so the caller falls back.
    fn primary_lines(
        &self,
        image: &[u8],
        raw_blocks: &mut usize,
    ) -> Result<Vec<RecognizedLine>, RecognitionError> {
        let recognition = self.math.recognize(image, &RecognizeOptions::full_page())?;
        *raw_blocks += recognition.lines.len();

        let mut lines = Vec::with_capacity(recognition.lines.len());
        for line in &recognition.lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            let Some(rect) = bbox::extract_rect(&line.geometry) else {
                debug!(text, "dropping line with unusable geometry");
                continue;
            };
            if !rect.is_valid() {
                debug!(text, ?rect, "dropping line with degenerate box");
                continue;
            }
            lines.push(RecognizedLine::new(
                text,
                rect,
                line.confidence.unwrap_or(1.0),
                SourceBackend::Math,
            ));
        }

        if lines.is_empty() {
            return Err(RecognitionError::NoUsableData);
        }
        Ok(lines)
    }

    /// Fallback strategy: robust layout fragments, margin-filtered, then
    /// selectively re-recognized through the math backend. Lines are
    /// returned in the fragments' page order regardless of the order
    /// they were processed in.
    ///
    /// High-confidence fragments keep their fast-path text without a
    /// second call; the classifier only prioritizes which of the rest
    /// get re-recognized first. Fragments whose padded crop matches one
    /// already sent also keep their fast-path text. A failed per-region
    /// call degrades that fragment to its fast-path text.
    fn fallback_lines(
        &self,
        image: &[u8],
        recognizer_calls: &mut u32,
        raw_blocks: &mut usize,
    ) -> Result<(Vec<RecognizedLine>, ImageDimensions), RecognitionError> {
        let dims = self.vision.image_dimensions(image)?;
        let fragments = self.vision.robust_recognize(
            image,
            self.config.cluster_eps,
            self.config.cluster_min_pts,
        )?;
        *raw_blocks += fragments.len();

        let mut candidates: Vec<(usize, String, Rect, f64, MathLikeness)> = Vec::new();
        for (position, fragment) in fragments.into_iter().enumerate() {
            let rect = fragment.geometry.to_rect();
            if !rect.is_valid() {
                debug!(text = %fragment.text, "dropping fragment with degenerate box");
                continue;
            }
            if postprocess::in_margin_band(&rect, dims) {
                debug!(text = %fragment.text, "dropping margin fragment");
                continue;
            }
            let likeness = self.classifier.classify(&fragment.text);
            candidates.push((position, fragment.text, rect, fragment.confidence, likeness));
        }

        // Re-recognize the least trustworthy, most math-like text first.
        // This is a processing order only; lines are restored to the
        // backend's page order below, which the boundary cut relies on.
        candidates.sort_by(|a, b| {
            b.4.suspicious
                .cmp(&a.4.suspicious)
                .then(b.4.score.total_cmp(&a.4.score))
        });

        let mut seen_crops: HashSet<String> = HashSet::new();
        let mut lines: Vec<(usize, RecognizedLine)> = Vec::with_capacity(candidates.len());

        for (position, text, rect, confidence, _) in candidates {
            let fast_path = RecognizedLine::new(text, rect, confidence, SourceBackend::Vision);

            if confidence >= thresholds::FAST_PATH_CONFIDENCE {
                lines.push((position, fast_path));
                continue;
            }
            if !seen_crops.insert(rect.crop_signature()) {
                debug!(signature = %rect.crop_signature(), "duplicate crop, reusing fast-path text");
                lines.push((position, fast_path));
                continue;
            }

            let cropped = match self.cropper.crop(image, &rect) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(error = %e, "crop failed, keeping fast-path text");
                    lines.push((position, fast_path));
                    continue;
                }
            };

            // The math backend rate-limits; space out successive calls.
            if *recognizer_calls > 0 {
                thread::sleep(self.config.recognizer_delay());
            }
            *recognizer_calls += 1;

            match self.math.recognize(&cropped, &RecognizeOptions::region()) {
                Ok(recognition) => {
                    let recognized = recognition
                        .text
                        .as_deref()
                        .map(str::trim)
                        .filter(|t| !t.is_empty());
                    match recognized {
                        Some(better) => {
                            let mut line = RecognizedLine::new(
                                better,
                                rect,
                                recognition
                                    .lines
                                    .first()
                                    .and_then(|l| l.confidence)
                                    .unwrap_or(confidence),
                                SourceBackend::Math,
                            );
                            // Math-confirmed content skips the inclusion
                            // filter even when it reads like prose.
                            line.filter_exempt = true;
                            lines.push((position, line));
                        }
                        None => lines.push((position, fast_path)),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "region re-recognition failed, keeping fast-path text");
                    lines.push((position, fast_path));
                }
            }
        }

        // Back to page order for the boundary cut.
        lines.sort_by_key(|(position, _)| *position);
        Ok((lines.into_iter().map(|(_, line)| line).collect(), dims))
    }
}

// ──────────────────────────────────────────────
// HeuristicMathClassifier
// ──────────────────────────────────────────────

/// Character-class heuristic for deciding whether fragment text reads
/// like mathematical working.
///
/// Score is the fraction of non-whitespace characters drawn from digits
/// and operator symbols. A fragment is suspicious when it scores as
/// mathy but carries almost no content to anchor it, which is the
/// typical shape of a garbled fast-path read.
pub struct HeuristicMathClassifier;

const MATH_CHARS: &str = "+-=×÷*/^().,%£$€°";

impl MathLikenessClassifier for HeuristicMathClassifier {
    fn classify(&self, text: &str) -> MathLikeness {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return MathLikeness {
                score: 0.0,
                suspicious: true,
            };
        }

        let total = trimmed.chars().filter(|c| !c.is_whitespace()).count();
        let mathy = trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || MATH_CHARS.contains(*c))
            .count();
        let score = mathy as f64 / total.max(1) as f64;

        let has_digit = trimmed.chars().any(|c| c.is_ascii_digit());
        let suspicious = trimmed.contains('\u{FFFD}')
            || (score >= 0.5 && !has_digit && total <= 3);

        MathLikeness { score, suspicious }
    }
}
