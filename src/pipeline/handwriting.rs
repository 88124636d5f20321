//! Handwriting correlator: tags lines as handwritten via spatial overlap
//! with regions from the independent handwriting detector.
//!
//! Overlap is normalized by the *line's own* area, not full IoU: detector
//! regions are typically much coarser than individual lines, so a line
//! sitting inside a big handwriting blob still correlates strongly even
//! though the blob's area dwarfs it.

use super::types::{Rect, RecognizedLine};
use crate::config::thresholds;

/// Tag lines whose boxes overlap a handwriting region by at least
/// [`thresholds::HANDWRITING_OVERLAP`] of their own area. Lines already
/// tagged upstream stay tagged.
pub fn tag_handwritten(
    lines: Vec<RecognizedLine>,
    regions: &[Rect],
) -> Vec<RecognizedLine> {
    lines
        .into_iter()
        .map(|mut line| {
            line.is_handwritten = line.is_handwritten || overlaps_any(&line.region, regions);
            line
        })
        .collect()
}

fn overlaps_any(line_rect: &Rect, regions: &[Rect]) -> bool {
    let area = line_rect.area();
    if area <= 0.0 {
        return false;
    }
    regions
        .iter()
        .any(|r| line_rect.intersection_area(r) / area >= thresholds::HANDWRITING_OVERLAP)
}
