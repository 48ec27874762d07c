// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar geometry tagged with the coordinate frame it lives in.
//
// Three frames exist: the canonical 640x400 detection frame, the source
// frame (pixels of a cropped or full-resolution capture) and the rectified
// output canvas. Points of different frames are distinct types; moving
// between them requires an explicit `FrameScale`.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Width of the canonical detection frame in pixels.
pub const CANONICAL_WIDTH: u32 = 640;
/// Height of the canonical detection frame in pixels.
pub const CANONICAL_HEIGHT: u32 = 400;

/// Marker trait for coordinate frames.
pub trait CoordinateFrame:
    fmt::Debug + Clone + Copy + Default + PartialEq + Send + Sync + 'static
{
    /// Short name used in log output.
    const NAME: &'static str;
}

/// The fixed 640x400 working resolution used for all detection geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Canonical;

/// Pixel coordinates of a captured image (cropped frame or fresh capture).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Source;

/// Pixel coordinates of a rectified output canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rectified;

impl CoordinateFrame for Canonical {
    const NAME: &'static str = "canonical";
}

impl CoordinateFrame for Source {
    const NAME: &'static str = "source";
}

impl CoordinateFrame for Rectified {
    const NAME: &'static str = "rectified";
}

/// A 2-D point in coordinate frame `F`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<F: CoordinateFrame> {
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    frame: PhantomData<F>,
}

impl<F: CoordinateFrame> Point<F> {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            frame: PhantomData,
        }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// `x + y`; smallest at the top-left corner, largest at the bottom-right.
    pub fn sum(&self) -> f64 {
        self.x + self.y
    }

    /// `y - x`; smallest at the top-right corner, largest at the bottom-left.
    pub fn diff(&self) -> f64 {
        self.y - self.x
    }

    pub fn as_f32(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }

    fn scaled<G: CoordinateFrame>(&self, sx: f64, sy: f64) -> Point<G> {
        Point::new(self.x * sx, self.y * sy)
    }
}

impl<F: CoordinateFrame> fmt::Display for Point<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})@{}", self.x, self.y, F::NAME)
    }
}

/// Per-axis scale factors from the canonical frame to a source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScale {
    pub sx: f64,
    pub sy: f64,
}

impl FrameScale {
    /// Scale mapping canonical coordinates onto an image of `width` x `height`,
    /// i.e. `(width / 640, height / 400)`.
    pub fn canonical_to(width: u32, height: u32) -> Self {
        Self {
            sx: f64::from(width) / f64::from(CANONICAL_WIDTH),
            sy: f64::from(height) / f64::from(CANONICAL_HEIGHT),
        }
    }
}

/// Four corners in the fixed order `[top_left, top_right, bottom_right, bottom_left]`.
///
/// The order is established once by the corner classifier and carried
/// unchanged through every scaling step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Quad<F: CoordinateFrame> {
    corners: [Point<F>; 4],
}

impl<F: CoordinateFrame> Quad<F> {
    pub fn new(
        top_left: Point<F>,
        top_right: Point<F>,
        bottom_right: Point<F>,
        bottom_left: Point<F>,
    ) -> Self {
        Self {
            corners: [top_left, top_right, bottom_right, bottom_left],
        }
    }

    /// Build from eight coordinates in corner order (x1, y1, .., x4, y4).
    pub fn from_coords(c: [f64; 8]) -> Self {
        Self::new(
            Point::new(c[0], c[1]),
            Point::new(c[2], c[3]),
            Point::new(c[4], c[5]),
            Point::new(c[6], c[7]),
        )
    }

    /// Flatten into eight coordinates in corner order.
    pub fn to_coords(&self) -> [f64; 8] {
        let [a, b, c, d] = self.corners;
        [a.x, a.y, b.x, b.y, c.x, c.y, d.x, d.y]
    }

    pub fn top_left(&self) -> Point<F> {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point<F> {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point<F> {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point<F> {
        self.corners[3]
    }

    pub fn corners(&self) -> &[Point<F>; 4] {
        &self.corners
    }

    pub fn as_f32_array(&self) -> [(f32, f32); 4] {
        self.corners.map(|p| p.as_f32())
    }
}

impl Quad<Canonical> {
    /// Map canonical corners onto a source image.
    pub fn to_source(&self, scale: FrameScale) -> Quad<Source> {
        Quad {
            corners: self.corners.map(|p| p.scaled(scale.sx, scale.sy)),
        }
    }
}

impl<F: CoordinateFrame> fmt::Display for Quad<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.corners;
        write!(f, "[{a}, {b}, {c}, {d}]")
    }
}

/// Pixel dimensions of a rectified image, compared frame-to-frame by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RectifiedSize {
    pub width: u32,
    pub height: u32,
}

impl RectifiedSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Per-axis relative change `|self - previous| / previous` as `(width, height)`.
    pub fn relative_change(&self, previous: &Self) -> (f64, f64) {
        let ratio = |current: u32, prior: u32| {
            (f64::from(current) - f64::from(prior)).abs() / f64::from(prior)
        };
        (
            ratio(self.width, previous.width),
            ratio(self.height, previous.height),
        )
    }
}

impl fmt::Display for RectifiedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
