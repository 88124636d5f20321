//! Bounding-box normalizer.
//!
//! The two backends (and successive API versions of each) describe a
//! line's box in several shapes: a nested rectangle object under two
//! different field-naming conventions, flat fields on the line itself, or
//! a raw contour polygon. This module reduces all of them to one
//! canonical [`Rect`] via an ordered list of extractor strategies, each
//! tried in sequence. A strategy that finds its fields but cannot produce
//! a finite, positive-size rect falls through to the next; if none match
//! the caller drops the line.

use serde_json::Value;

use super::types::Rect;

/// Containers a nested rectangle may live under.
const RECT_CONTAINERS: &[&str] = &["region", "bounding_box", "boundingBox"];

/// Field aliases, snake_case first then camelCase.
const TOP_LEFT_X: &[&str] = &["top_left_x", "topLeftX"];
const TOP_LEFT_Y: &[&str] = &["top_left_y", "topLeftY"];
const MIN_X: &[&str] = &["x", "min_x", "minX"];
const MIN_Y: &[&str] = &["y", "min_y", "minY"];
const WIDTH: &[&str] = &["width", "w"];
const HEIGHT: &[&str] = &["height", "h"];
const POINT_LISTS: &[&str] = &["cnt", "points", "polygon"];

/// Extract a canonical rect from a backend line/region object.
///
/// Strategies, in order:
/// 1. nested rect as top-left + width/height
/// 2. nested rect as x/y (or min-x/min-y) + width/height
/// 3. flat x/y/width/height on the line itself
/// 4. polygon/contour point list → axis-aligned bounding box
pub fn extract_rect(line: &Value) -> Option<Rect> {
    for container in nested_containers(line) {
        if let Some(rect) = top_left_rect(container) {
            return Some(rect);
        }
        if let Some(rect) = xy_rect(container) {
            return Some(rect);
        }
    }

    if let Some(rect) = xy_rect(line) {
        return Some(rect);
    }

    polygon_rect(line)
}

fn nested_containers(line: &Value) -> impl Iterator<Item = &Value> {
    RECT_CONTAINERS
        .iter()
        .filter_map(|key| line.get(key))
        .filter(|v| v.is_object())
}

/// Strategy 1: `{top_left_x, top_left_y, width, height}` (either naming).
fn top_left_rect(obj: &Value) -> Option<Rect> {
    let rect = Rect::new(
        field(obj, TOP_LEFT_X)?,
        field(obj, TOP_LEFT_Y)?,
        field(obj, WIDTH)?,
        field(obj, HEIGHT)?,
    );
    rect.is_valid().then_some(rect)
}

/// Strategies 2 and 3: `{x|min_x, y|min_y, width, height}`.
fn xy_rect(obj: &Value) -> Option<Rect> {
    let rect = Rect::new(
        field(obj, MIN_X)?,
        field(obj, MIN_Y)?,
        field(obj, WIDTH)?,
        field(obj, HEIGHT)?,
    );
    rect.is_valid().then_some(rect)
}

/// Strategy 4: axis-aligned bounding box over a contour point list.
/// Points may be 2-element arrays or `{x, y}` objects; invalid points
/// are skipped, and at least two valid points are required to span a
/// box with positive area.
fn polygon_rect(line: &Value) -> Option<Rect> {
    let points = POINT_LISTS
        .iter()
        .filter_map(|key| line.get(key))
        .find_map(Value::as_array)?;

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut valid = 0usize;

    for point in points {
        let (x, y) = match point {
            Value::Array(pair) if pair.len() >= 2 => {
                match (pair[0].as_f64(), pair[1].as_f64()) {
                    (Some(x), Some(y)) => (x, y),
                    _ => continue,
                }
            }
            Value::Object(_) => match (number(point.get("x")), number(point.get("y"))) {
                (Some(x), Some(y)) => (x, y),
                _ => continue,
            },
            _ => continue,
        };
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
        valid += 1;
    }

    if valid < 2 {
        return None;
    }
    let rect = Rect::new(min_x, min_y, max_x - min_x, max_y - min_y);
    rect.is_valid().then_some(rect)
}

/// First finite numeric value among the aliased field names.
fn field(obj: &Value, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .find_map(|key| number(obj.get(key)))
        .filter(|v| v.is_finite())
}

fn number(value: Option<&Value>) -> Option<f64> {
    value?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_top_left_snake_case() {
        let line = json!({
            "text": "2x + 3",
            "region": {"top_left_x": 10.0, "top_left_y": 20.0, "width": 100.0, "height": 30.0}
        });
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(10.0, 20.0, 100.0, 30.0));
    }

    #[test]
    fn nested_top_left_camel_case() {
        let line = json!({
            "boundingBox": {"topLeftX": 5, "topLeftY": 6, "width": 7, "height": 8}
        });
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(5.0, 6.0, 7.0, 8.0));
    }

    #[test]
    fn nested_xy_rect() {
        let line = json!({
            "region": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}
        });
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn flat_fields_on_line() {
        let line = json!({"text": "x = 4", "x": 12, "y": 34, "width": 56, "height": 7});
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(12.0, 34.0, 56.0, 7.0));
    }

    #[test]
    fn contour_as_point_arrays() {
        let line = json!({"cnt": [[10, 40], [110, 40], [110, 70], [10, 70]]});
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(10.0, 40.0, 100.0, 30.0));
    }

    #[test]
    fn contour_as_point_objects() {
        let line = json!({"points": [{"x": 0, "y": 0}, {"x": 50, "y": 20}]});
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 50.0, 20.0));
    }

    #[test]
    fn contour_skips_malformed_points() {
        let line = json!({"cnt": [[10, 40], "junk", [110, 70], [5]]});
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(10.0, 40.0, 100.0, 30.0));
    }

    #[test]
    fn single_point_contour_rejected() {
        let line = json!({"cnt": [[10, 40]]});
        assert!(extract_rect(&line).is_none());
    }

    #[test]
    fn degenerate_contour_rejected() {
        // Two identical points span a zero-area box.
        let line = json!({"cnt": [[10, 40], [10, 40]]});
        assert!(extract_rect(&line).is_none());
    }

    #[test]
    fn zero_size_nested_rect_falls_through_to_contour() {
        let line = json!({
            "region": {"x": 1, "y": 2, "width": 0, "height": 4},
            "cnt": [[0, 0], [10, 10]]
        });
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn missing_fields_return_none() {
        let line = json!({"text": "no geometry at all"});
        assert!(extract_rect(&line).is_none());
    }

    #[test]
    fn non_numeric_fields_return_none() {
        let line = json!({"x": "ten", "y": 2, "width": 3, "height": 4});
        assert!(extract_rect(&line).is_none());
    }

    #[test]
    fn prefers_nested_region_over_flat_fields() {
        let line = json!({
            "x": 99, "y": 99, "width": 9, "height": 9,
            "region": {"top_left_x": 1, "top_left_y": 2, "width": 3, "height": 4}
        });
        let rect = extract_rect(&line).unwrap();
        assert_eq!(rect, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}
