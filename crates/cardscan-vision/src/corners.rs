// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner classifier — assigns an unordered point cloud to the four logical
// corners of a roughly axis-aligned quadrilateral.

use std::cmp::Ordering;

use cardscan_core::{CoordinateFrame, Point, Quad};

/// Pick the four extreme points of `points` as `[top_left, top_right,
/// bottom_right, bottom_left]`.
///
/// Top-left has the smallest `x + y`, bottom-right the largest. Top-right has
/// the smallest `y - x`, bottom-left the largest. The result does not depend
/// on input order; ties go to the earliest point in sorted-by-key order,
/// which is itself order-independent because ties are broken on the other
/// coordinate.
///
/// Only meaningful for convex, roughly upright quadrilaterals (a hull point
/// cloud reduces naturally to its four extremes). Collinear or duplicated
/// extremes are not rejected here; the rectifier reports the resulting
/// degenerate geometry. Returns `None` for fewer than four points.
pub fn classify<F: CoordinateFrame>(points: &[Point<F>]) -> Option<Quad<F>> {
    if points.len() < 4 {
        return None;
    }

    let by = |key: fn(&Point<F>) -> f64| {
        move |a: &&Point<F>, b: &&Point<F>| {
            key(a)
                .partial_cmp(&key(b))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
                .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
        }
    };

    let top_left = *points.iter().min_by(by(Point::sum))?;
    let bottom_right = *points.iter().max_by(by(Point::sum))?;
    let top_right = *points.iter().min_by(by(Point::diff))?;
    let bottom_left = *points.iter().max_by(by(Point::diff))?;

    Some(Quad::new(top_left, top_right, bottom_right, bottom_left))
}
