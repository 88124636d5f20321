//! Line post-processor: split merged multi-row text, filter margin and
//! scan noise, classify ambiguous lines.
//!
//! Runs on the lines left after the boundary cut. Splitting applies to
//! both strategies; the inclusion filter only to the fallback path,
//! whose cluster-based fragments pick up page furniture (question
//! numbers, mark tallies, printer margins) that the math backend's
//! per-line output never produces. The filter is precision-biased: it
//! errs toward dropping ambiguous prose rather than polluting the
//! student's work.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::types::{ImageDimensions, Rect, RecognizedLine};
use crate::config::thresholds;

/// Marker the math backend leaves between rows it merged into one line
/// (array detection): a literal backslash-n escape, not a newline.
const MERGED_ROW_MARKER: &str = "\\n";

/// Footer printed at the bottom of every exam question.
const FOOTER_MARKER: &str = "total for question";

/// Word-count ceiling for the digit+symbol inclusion rule; longer text
/// is prose that merely mentions a number.
const MAX_EXPRESSION_WORDS: usize = 7;

/// Character ceiling for the bare number/currency inclusion rule.
const MAX_NUMERIC_CHARS: usize = 10;

/// LaTeX array/bracket markup that wraps merged rows.
static ARRAY_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\begin\{array\}\{[^}]*\}|\\end\{array\}|\\\[|\\\]").unwrap()
});

/// Bare page/question number: 1 to 3 digits and nothing else.
static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,3}$").unwrap());

/// Arithmetic operator, currency, percent, or degree — the symbols that
/// mark a short line as working rather than prose.
static MATH_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+\-×÷*/^%£$€°]|\b(?:cm|mm|km|kg|ml|m|g|l)\b").unwrap());

/// Number, optionally currency-prefixed/suffixed, after markup strip.
static PURE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[£$€]?\d+(?:[.,]\d+)?[£$€%]?$").unwrap());

/// Inline-math wrappers the math backend puts around short answers.
static INLINE_MATH_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\(|\\\)|\$").unwrap());

/// Split any line containing the merged-row marker into one line per
/// row, distributing the original height evenly across fragments. Each
/// fragment inherits x/width and confidence; y shifts proportionally.
pub fn split_merged_lines(lines: Vec<RecognizedLine>) -> Vec<RecognizedLine> {
    let mut result = Vec::with_capacity(lines.len());

    for line in lines {
        if !line.text.contains(MERGED_ROW_MARKER) {
            result.push(line);
            continue;
        }

        let stripped = ARRAY_MARKUP.replace_all(&line.text, "");
        let fragments: Vec<&str> = stripped
            .split(MERGED_ROW_MARKER)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();

        if fragments.is_empty() {
            continue;
        }

        let count = fragments.len();
        let fragment_height = line.region.height / count as f64;
        debug!(original = %line.text, count, "splitting merged line");

        for (i, fragment) in fragments.into_iter().enumerate() {
            let mut part = line.clone();
            part.text = fragment.to_string();
            part.region = Rect::new(
                line.region.x,
                line.region.y + i as f64 * fragment_height,
                line.region.width,
                fragment_height,
            );
            result.push(part);
        }
    }

    result
}

/// Inclusion filter for fallback-path lines. `filter_exempt` lines
/// (math-confirmed by re-recognition) pass through untouched.
pub fn filter_work_lines(
    lines: Vec<RecognizedLine>,
    dims: ImageDimensions,
) -> Vec<RecognizedLine> {
    lines
        .into_iter()
        .filter(|line| {
            if line.filter_exempt {
                return true;
            }
            match classify(line, dims) {
                Verdict::Keep => true,
                Verdict::Drop(reason) => {
                    debug!(text = %line.text, reason, "dropping fallback line");
                    false
                }
            }
        })
        .collect()
}

enum Verdict {
    Keep,
    Drop(&'static str),
}

fn classify(line: &RecognizedLine, dims: ImageDimensions) -> Verdict {
    let text = line.text.trim();

    if text.is_empty() {
        return Verdict::Drop("empty");
    }
    if text.to_lowercase().contains(FOOTER_MARKER) {
        return Verdict::Drop("question footer");
    }
    if BARE_NUMBER.is_match(text) {
        return Verdict::Drop("bare page/question number");
    }
    if text.contains('=') {
        return Verdict::Keep;
    }

    let has_digit = text.chars().any(|c| c.is_ascii_digit());
    let word_count = text.split_whitespace().count();
    if has_digit && word_count < MAX_EXPRESSION_WORDS && MATH_SYMBOL.is_match(text) {
        return Verdict::Keep;
    }

    let unwrapped = INLINE_MATH_WRAPPER.replace_all(text, "");
    let unwrapped = unwrapped.trim();
    if unwrapped.len() < MAX_NUMERIC_CHARS && PURE_NUMERIC.is_match(unwrapped) {
        return Verdict::Keep;
    }

    if in_margin_band(&line.region, dims) {
        return Verdict::Drop("margin noise");
    }

    Verdict::Drop("unclassified prose")
}

/// Whether a rect sits in the page's margin noise bands: within 5% of
/// image height from the top or bottom edge, or within 10% of image
/// width from the right edge.
pub fn in_margin_band(rect: &Rect, dims: ImageDimensions) -> bool {
    let vertical = dims.height * thresholds::MARGIN_VERTICAL;
    let right = dims.width * (1.0 - thresholds::MARGIN_RIGHT);

    rect.y < vertical || rect.y + rect.height > dims.height - vertical || rect.x > right
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SourceBackend;

    const DIMS: ImageDimensions = ImageDimensions {
        width: 1000.0,
        height: 1400.0,
    };

    fn line(text: &str) -> RecognizedLine {
        // Comfortably mid-page.
        RecognizedLine::new(
            text,
            Rect::new(100.0, 400.0, 300.0, 30.0),
            0.8,
            SourceBackend::Vision,
        )
    }

    fn line_at(text: &str, rect: Rect) -> RecognizedLine {
        RecognizedLine::new(text, rect, 0.8, SourceBackend::Vision)
    }

    // ── split_merged_lines ──

    #[test]
    fn unmarked_line_passes_through() {
        let input = vec![line("3x = 12")];
        let out = split_merged_lines(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn merged_line_splits_into_fragments() {
        let merged = line_at(
            "\\[\\begin{array}{l}3x+5=17\\n3x=12\\nx=4\\end{array}\\]",
            Rect::new(50.0, 100.0, 240.0, 90.0),
        );
        let out = split_merged_lines(vec![merged]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text, "3x+5=17");
        assert_eq!(out[1].text, "3x=12");
        assert_eq!(out[2].text, "x=4");
    }

    #[test]
    fn fragment_heights_sum_to_original() {
        let merged = line_at("a = 1\\nb = 2\\nc = 3", Rect::new(50.0, 100.0, 240.0, 100.0));
        let out = split_merged_lines(vec![merged]);
        let total: f64 = out.iter().map(|l| l.region.height).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn fragments_inherit_x_and_width() {
        let merged = line_at("a = 1\\nb = 2", Rect::new(50.0, 100.0, 240.0, 60.0));
        let out = split_merged_lines(vec![merged]);
        for part in &out {
            assert_eq!(part.region.x, 50.0);
            assert_eq!(part.region.width, 240.0);
        }
        // Rows stack downward.
        assert_eq!(out[0].region.y, 100.0);
        assert_eq!(out[1].region.y, 130.0);
    }

    #[test]
    fn empty_fragments_discarded() {
        let merged = line("x = 1\\n\\n  \\nx = 2");
        let out = split_merged_lines(vec![merged]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn marker_only_line_removed() {
        let merged = line("\\n\\n");
        let out = split_merged_lines(vec![merged]);
        assert!(out.is_empty());
    }

    // ── filter_work_lines ──

    #[test]
    fn equation_always_kept() {
        let out = filter_work_lines(vec![line("3x + 5 = 17")], DIMS);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn bare_page_number_dropped() {
        let out = filter_work_lines(vec![line("12")], DIMS);
        assert!(out.is_empty());
    }

    #[test]
    fn four_digit_number_not_treated_as_page_number() {
        // 2024 could be a student's intermediate result; the pure-numeric
        // rule keeps it.
        let out = filter_work_lines(vec![line("2024")], DIMS);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn footer_marker_dropped() {
        let out = filter_work_lines(vec![line("(Total for Question 3 is 4 marks)")], DIMS);
        assert!(out.is_empty());
    }

    #[test]
    fn empty_text_dropped() {
        let out = filter_work_lines(vec![line("   ")], DIMS);
        assert!(out.is_empty());
    }

    #[test]
    fn short_expression_with_digit_and_symbol_kept() {
        let out = filter_work_lines(vec![line("12 + 7.50"), line("4 × 7")], DIMS);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn currency_answer_kept() {
        let out = filter_work_lines(vec![line("£19.50")], DIMS);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn wrapped_numeric_answer_kept() {
        let out = filter_work_lines(vec![line("\\(28.5\\)")], DIMS);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn long_prose_with_digit_dropped() {
        let out = filter_work_lines(
            vec![line("the diagram shows 3 shapes drawn on a centimetre grid below")],
            DIMS,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn ambiguous_prose_dropped() {
        let out = filter_work_lines(vec![line("some stray handwriting notes")], DIMS);
        assert!(out.is_empty());
    }

    #[test]
    fn exempt_line_bypasses_filter() {
        let mut l = line("could be anything at all");
        l.filter_exempt = true;
        let out = filter_work_lines(vec![l], DIMS);
        assert_eq!(out.len(), 1);
    }

    // ── in_margin_band ──

    #[test]
    fn top_margin_detected() {
        assert!(in_margin_band(&Rect::new(100.0, 20.0, 100.0, 20.0), DIMS));
    }

    #[test]
    fn bottom_margin_detected() {
        assert!(in_margin_band(&Rect::new(100.0, 1360.0, 100.0, 30.0), DIMS));
    }

    #[test]
    fn right_margin_detected() {
        assert!(in_margin_band(&Rect::new(950.0, 500.0, 40.0, 20.0), DIMS));
    }

    #[test]
    fn center_of_page_not_margin() {
        assert!(!in_margin_band(&Rect::new(200.0, 600.0, 300.0, 30.0), DIMS));
    }
}
