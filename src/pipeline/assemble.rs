//! Output assembler: projects the final ordered lines into
//! [`StudentWorkStep`]s and builds the id→location lookup table used for
//! downstream re-localization.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::types::{RecognizedLine, StepLocation, StudentWorkStep};

/// Assign sequential `step_{n}` ids to the sorted lines and build the
/// lookup table. Ids are assigned only here, after final ordering, and
/// are not stable across reprocessing.
///
/// A line with an invalid rect is skipped with a warning; one bad entry
/// never aborts assembly.
pub fn assemble_steps(
    lines: &[RecognizedLine],
) -> (Vec<StudentWorkStep>, HashMap<String, StepLocation>) {
    let mut steps = Vec::with_capacity(lines.len());
    let mut lookup = HashMap::with_capacity(lines.len());

    for line in lines {
        if !line.region.is_valid() {
            warn!(text = %line.text, "skipping step with invalid bbox");
            continue;
        }

        let id = format!("step_{}", steps.len() + 1);
        let bbox = [
            line.region.x,
            line.region.y,
            line.region.width,
            line.region.height,
        ];

        lookup.insert(
            id.clone(),
            StepLocation {
                bbox,
                text: line.text.clone(),
            },
        );
        steps.push(StudentWorkStep {
            id,
            text: line.text.clone(),
            bbox,
            confidence: line.confidence,
        });
    }

    debug!(steps = steps.len(), "assembled student work steps");
    (steps, lookup)
}
