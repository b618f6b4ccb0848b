//! Bounding boxes and frame-relative coordinates.
//!
//! Layout oracles do not agree on what a node's `x`/`y` means: tree layouts
//! report centers, graph layouts report top-left corners. Mixing the two
//! shifts every widget by half its own size, so each helper names its
//! convention explicitly.

use crate::model::{Anchor, Geometry};
use kurbo::{Point, Rect};

/// Union of boxes whose `x`/`y` is the box center.
pub fn bounding_box_from_center<'a>(boxes: impl IntoIterator<Item = &'a Geometry>) -> Option<Rect> {
    bounding_box(boxes, Anchor::Center)
}

/// Union of boxes whose `x`/`y` is the top-left corner.
pub fn bounding_box_from_top_left<'a>(boxes: impl IntoIterator<Item = &'a Geometry>) -> Option<Rect> {
    bounding_box(boxes, Anchor::TopLeft)
}

/// Union of boxes under the given anchor convention. `None` when empty.
pub fn bounding_box<'a>(boxes: impl IntoIterator<Item = &'a Geometry>, anchor: Anchor) -> Option<Rect> {
    boxes
        .into_iter()
        .map(|g| g.rect(anchor))
        .reduce(|acc, r| acc.union(r))
}

/// Map an absolute point to fractional coordinates inside `frame`, where
/// `frame.x`/`y` is its top-left corner. `(0, 0)` is the top-left corner,
/// `(1, 1)` the bottom-right.
pub fn relative_position(frame: &Geometry, point: Point) -> Point {
    let fx = if frame.width == 0.0 { 0.0 } else { (point.x - frame.x) / frame.width };
    let fy = if frame.height == 0.0 { 0.0 } else { (point.y - frame.y) / frame.height };
    Point::new(fx, fy)
}

/// Offset of `point` from the top-left corner of `frame`.
pub fn offset_in(frame: Rect, point: Point) -> Point {
    Point::new(point.x - frame.x0, point.y - frame.y0)
}

/// Grow a rectangle by `pad` on every side.
pub fn padded(rect: Rect, pad: f64) -> Rect {
    rect.inflate(pad, pad)
}
