// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame candidate detector — finds the card boundary in one captured frame
// and rectifies it at the resolution of the crop.

use std::cmp::Ordering;

use cardscan_core::error::{Result, ScanError};
use cardscan_core::{Canonical, DetectorConfig, FrameScale, Observation, Point, Quad, RectifiedSize};
use image::{GrayImage, RgbImage, imageops};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, convex_hull};
use imageproc::morphology::{Mask, dilate, grayscale_dilate, grayscale_erode};
use imageproc::point::Point as PixelPoint;
use tracing::{debug, info, instrument, warn};

use crate::corners::classify;
use crate::image::processor::{CropWindow, crop, resize_exact};
use crate::rectify::{rectified_size, rectify};

/// One frame's detection result.
#[derive(Debug, Clone)]
pub struct FrameCandidate {
    /// Card corners in the canonical (640x400) frame.
    pub quad: Quad<Canonical>,
    /// The card warped upright at the resolution of the source crop.
    pub rectified: RgbImage,
}

impl FrameCandidate {
    pub fn rectified_size(&self) -> RectifiedSize {
        RectifiedSize::new(self.rectified.width(), self.rectified.height())
    }

    /// What the consistency gate needs from this candidate.
    pub fn observation(&self) -> Observation {
        Observation {
            quad: self.quad,
            size: self.rectified_size(),
        }
    }
}

/// Detects a card-shaped quadrilateral in raw frames.
///
/// ## Pipeline
///
/// 1. Centre-crop the frame to the card aspect ratio (1.6:1)
/// 2. Resize the crop to the canonical 640x400 working frame
/// 3. Grayscale closing (5x5, three iterations) to suppress texture
/// 4. Gaussian blur, Canny edges, slight dilation to bridge gaps
/// 5. Trace every contour (outer borders and holes), largest area first
/// 6. Accept the first contour whose polygon approximation (2% of its
///    perimeter) has exactly four vertices
/// 7. Classify the extreme points of that contour's convex hull into corners
/// 8. Rectify the full-resolution crop through the scaled corners
#[derive(Debug, Clone, Default)]
pub struct CardDetector {
    config: DetectorConfig,
}

impl CardDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline on one decoded frame.
    ///
    /// `Ok(None)` means no usable card boundary in this frame, including a
    /// boundary whose rectification would be degenerate. `Err` is reserved
    /// for frames that violate the crop precondition.
    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub fn detect(&self, frame: &RgbImage) -> Result<Option<FrameCandidate>> {
        let cfg = &self.config;
        let window = CropWindow::centered(
            frame.width(),
            frame.height(),
            cfg.aspect_ratio,
            cfg.crop_fraction,
        )?;
        let cropped = crop(frame, window);
        let working = resize_exact(&cropped, cfg.canonical_width, cfg.canonical_height);

        let Some(quad) = self.find_card(&imageops::grayscale(&working)) else {
            debug!("no four-sided contour in frame");
            return Ok(None);
        };

        let scale = FrameScale {
            sx: f64::from(window.width) / f64::from(cfg.canonical_width),
            sy: f64::from(window.height) / f64::from(cfg.canonical_height),
        };
        let source_quad = quad.to_source(scale);

        let size = rectified_size(&source_quad);
        if size.width < cfg.min_rectified_side || size.height < cfg.min_rectified_side {
            warn!(%size, %quad, "rejecting degenerate card boundary");
            return Ok(None);
        }

        match rectify(&cropped, &source_quad) {
            Ok(rectified) => {
                info!(%quad, %size, "card candidate detected");
                Ok(Some(FrameCandidate { quad, rectified }))
            }
            Err(ScanError::DegenerateGeometry(reason)) => {
                warn!(%reason, "rejecting degenerate card boundary");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Steps 3-7 on the canonical grayscale frame.
    fn find_card(&self, gray: &GrayImage) -> Option<Quad<Canonical>> {
        let edges = self.edge_map(gray);

        let mut contours: Vec<(f64, Vec<PixelPoint<i32>>)> = find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| contour.points.len() >= 4)
            .map(|contour| (contour_area(&contour.points), contour.points))
            .collect();
        contours.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        debug!(contours = contours.len(), "contours traced");

        let (area, boundary) = contours.into_iter().find(|(_, points)| {
            let epsilon = self.config.approx_epsilon_fraction * arc_length(points, true);
            epsilon > 0.0
                && approximate_polygon_dp(&start_at_corner(points), epsilon, true).len() == 4
        })?;
        debug!(area, points = boundary.len(), "four-sided contour accepted");

        let hull: Vec<Point<Canonical>> = convex_hull(boundary)
            .into_iter()
            .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
            .collect();
        classify(&hull)
    }

    /// Closing, blur, Canny, and dilation of the canonical frame.
    fn edge_map(&self, gray: &GrayImage) -> GrayImage {
        let cfg = &self.config;

        let mut closed = gray.clone();
        if cfg.close_radius > 0 {
            let mask = Mask::square(cfg.close_radius);
            for _ in 0..cfg.close_iterations {
                closed = grayscale_dilate(&closed, &mask);
            }
            for _ in 0..cfg.close_iterations {
                closed = grayscale_erode(&closed, &mask);
            }
        }

        let blurred = gaussian_blur_f32(&closed, cfg.blur_sigma);
        let edges = canny(&blurred, cfg.canny_low, cfg.canny_high);
        if cfg.dilate_radius == 0 {
            edges
        } else {
            dilate(&edges, Norm::LInf, cfg.dilate_radius)
        }
    }
}

/// Rotate a closed contour so it starts at its smallest `x + y` point.
///
/// Douglas-Peucker always keeps the first point, so the walk must begin on
/// a true vertex; the top-left extreme of a convex shape is one.
fn start_at_corner(points: &[PixelPoint<i32>]) -> Vec<PixelPoint<i32>> {
    let start = points
        .iter()
        .enumerate()
        .min_by_key(|(_, p)| (p.x + p.y, p.x))
        .map_or(0, |(i, _)| i);
    let mut rotated = points[start..].to_vec();
    rotated.extend_from_slice(&points[..start]);
    rotated
}
