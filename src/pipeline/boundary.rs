//! Boundary detector: where does the printed question end and the
//! student's work begin?
//!
//! With a known question transcript, recognized lines are fuzzy-matched
//! against the transcript's lines; the boundary is one past the *last*
//! matching line. Using "last" rather than "first" assumes the printed
//! question occupies a contiguous prefix of the page, so a later
//! false-positive match is intentionally ignored. Pages that interleave
//! printed sub-parts with handwritten work are a known limitation of this
//! heuristic.
//!
//! Without a transcript match, a keyword fallback scans backward for the
//! last line that reads like a printed instruction.

use tracing::debug;

use super::types::RecognizedLine;
use crate::config::thresholds;

/// Verbs that open a printed instruction on UK-style maths papers.
const INSTRUCTION_VERBS: &[&str] = &[
    "work out",
    "calculate",
    "explain",
    "show that",
    "find the",
    "write down",
];

/// Minimum word count for the keyword fallback: one- and two-word lines
/// are too likely to be student shorthand.
const MIN_INSTRUCTION_WORDS: usize = 3;

/// Index of the first student-work line.
///
/// Always in `[0, lines.len()]`. `lines.len()` means the whole page is
/// question text (legitimate for question-only photos); `0` means
/// everything is treated as work.
pub fn detect_work_start(lines: &[RecognizedLine], transcript: Option<&str>) -> usize {
    let transcript_lines: Vec<&str> = transcript
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if transcript_lines.is_empty() {
        return 0;
    }

    let mut last_match: Option<usize> = None;
    for (index, line) in lines.iter().enumerate() {
        let best = transcript_lines
            .iter()
            .map(|t| dice_similarity(&line.text, t))
            .fold(0.0f64, f64::max);
        if best >= thresholds::TRANSCRIPT_MATCH {
            last_match = Some(index);
        }
    }

    if let Some(index) = last_match {
        let boundary = (index + 1).min(lines.len());
        debug!(boundary, "question boundary from transcript match");
        return boundary;
    }

    if let Some(index) = last_instruction_line(lines) {
        let boundary = (index + 1).min(lines.len());
        debug!(boundary, "question boundary from instruction keyword");
        return boundary;
    }

    0
}

/// Backward scan for the last line that looks like a printed instruction:
/// contains an instruction verb, has more than two words, and contains
/// no `=` (an equals sign marks working, not a question).
fn last_instruction_line(lines: &[RecognizedLine]) -> Option<usize> {
    lines.iter().enumerate().rev().find_map(|(index, line)| {
        let lower = line.text.to_lowercase();
        let is_instruction = INSTRUCTION_VERBS.iter().any(|v| lower.contains(v))
            && line.text.split_whitespace().count() >= MIN_INSTRUCTION_WORDS
            && !line.text.contains('=');
        is_instruction.then_some(index)
    })
}

/// Bigram Dice coefficient in [0, 1] over lowercased,
/// whitespace-normalized text.
///
/// Strings shorter than one bigram compare by equality.
pub fn dice_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }
    let a_bigrams = bigrams(&a);
    let b_bigrams = bigrams(&b);
    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }

    let mut b_pool = b_bigrams.clone();
    let mut matches = 0usize;
    for bigram in &a_bigrams {
        if let Some(pos) = b_pool.iter().position(|other| other == bigram) {
            b_pool.swap_remove(pos);
            matches += 1;
        }
    }

    (2.0 * matches as f64) / (a_bigrams.len() + b_bigrams.len()) as f64
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn bigrams(text: &str) -> Vec<[char; 2]> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| [w[0], w[1]]).collect()
}
