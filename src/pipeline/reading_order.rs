//! Reading-order sorter: arranges final lines the way a human would read
//! them — left-to-right within a row, rows top-to-bottom.
//!
//! Two lines overlap "as a row" when their vertical intervals share
//! enough of either line's own height. That pairwise relation is not
//! transitive (a staircase of slightly drifting boxes chains A~B and
//! B~C while A and C are disjoint), so it cannot feed a comparator
//! directly: lines are instead clustered into rows by the transitive
//! closure of the overlap, rows ordered by their topmost edge, and row
//! members ordered by x.
//!
//! The threshold is adaptive: the primary strategy emits coherent
//! per-line boxes (0.30), while the fallback's cluster-based fragments
//! drift vertically and need a looser tolerance (0.10). Both sorts are
//! stable, so identical boxes keep backend order.

use super::types::{RecognizedLine, StrategyContext};

/// Reading-order sort under the active strategy's threshold.
pub fn sort_reading_order(
    mut lines: Vec<RecognizedLine>,
    ctx: &StrategyContext,
) -> Vec<RecognizedLine> {
    let threshold = ctx.same_row_threshold();

    lines.sort_by(|a, b| a.region.y.total_cmp(&b.region.y));

    let mut rows: Vec<Vec<RecognizedLine>> = Vec::new();
    for line in lines {
        let matching: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|member| row_overlap(member, &line, threshold)))
            .map(|(index, _)| index)
            .collect();

        match matching.split_first() {
            None => rows.push(vec![line]),
            Some((&first, rest)) => {
                // A tall line can bridge rows that were separate so far;
                // fold them into one.
                for &index in rest.iter().rev() {
                    let merged = rows.remove(index);
                    rows[first].extend(merged);
                }
                rows[first].push(line);
            }
        }
    }

    rows.sort_by(|a, b| row_top(a).total_cmp(&row_top(b)));

    let mut ordered = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| a.region.x.total_cmp(&b.region.x));
        ordered.extend(row);
    }
    ordered
}

/// Vertical overlap of the two lines' [y, y+height] intervals, expressed
/// as a fraction of each line's own height; row overlap when either
/// fraction meets the threshold.
fn row_overlap(a: &RecognizedLine, b: &RecognizedLine, threshold: f64) -> bool {
    let overlap = (a.region.y + a.region.height).min(b.region.y + b.region.height)
        - a.region.y.max(b.region.y);
    if overlap <= 0.0 {
        return false;
    }
    let frac_a = overlap / a.region.height;
    let frac_b = overlap / b.region.height;
    frac_a >= threshold || frac_b >= threshold
}

fn row_top(row: &[RecognizedLine]) -> f64 {
    row.iter()
        .map(|line| line.region.y)
        .fold(f64::INFINITY, f64::min)
}
