// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectifier — warps the quadrilateral spanned by four ordered
// corners onto an upright rectangle.

use cardscan_core::error::{Result, ScanError};
use cardscan_core::{Point, Quad, RectifiedSize, Rectified, Source};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, instrument, warn};

/// Smallest rectified side `rectify` will produce a transform for.
const MIN_SIDE: u32 = 2;

/// Output canvas size for `quad`.
///
/// Width is the longer of the top and bottom edges, height the longer of
/// the left and right edges, each rounded to the nearest pixel.
pub fn rectified_size(quad: &Quad<Source>) -> RectifiedSize {
    let width_bottom = quad.bottom_right().distance(&quad.bottom_left());
    let width_top = quad.top_right().distance(&quad.top_left());
    let height_right = quad.top_right().distance(&quad.bottom_right());
    let height_left = quad.top_left().distance(&quad.bottom_left());

    RectifiedSize::new(
        round_px(width_bottom).max(round_px(width_top)),
        round_px(height_right).max(round_px(height_left)),
    )
}

fn round_px(length: f64) -> u32 {
    if length.is_finite() && length > 0.0 {
        length.round() as u32
    } else {
        0
    }
}

/// The destination rectangle `[(0,0), (w-1,0), (w-1,h-1), (0,h-1)]`.
pub fn destination(size: RectifiedSize) -> Quad<Rectified> {
    let right = f64::from(size.width) - 1.0;
    let bottom = f64::from(size.height) - 1.0;
    Quad::new(
        Point::new(0.0, 0.0),
        Point::new(right, 0.0),
        Point::new(right, bottom),
        Point::new(0.0, bottom),
    )
}

/// Warp the region of `image` bounded by `quad` into a `rectified_size(quad)`
/// canvas.
///
/// The homography is the exact 8-parameter projective map taking the four
/// source corners onto the destination rectangle. Pixels that map outside
/// the source come out black; nothing is cropped or padded beyond that.
///
/// Fails with `DegenerateGeometry` when the quadrilateral collapses to a
/// line or point, or the four correspondences admit no projective map.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), quad = %quad))]
pub fn rectify(image: &RgbImage, quad: &Quad<Source>) -> Result<RgbImage> {
    let size = rectified_size(quad);
    if size.width < MIN_SIDE || size.height < MIN_SIDE {
        warn!(%size, "quadrilateral too small to rectify");
        return Err(ScanError::DegenerateGeometry(format!(
            "rectified size {size} below {MIN_SIDE}x{MIN_SIDE}"
        )));
    }

    let projection =
        Projection::from_control_points(quad.as_f32_array(), destination(size).as_f32_array())
            .ok_or_else(|| {
                warn!("no projective transform for corners");
                ScanError::DegenerateGeometry(format!("no homography for {quad}"))
            })?;

    let mut output = RgbImage::new(size.width, size.height);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut output,
    );

    debug!(%size, "rectified");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(c: [f64; 8]) -> Quad<Source> {
        Quad::from_coords(c)
    }

    /// Left half dark, right half bright, with a bright stripe along the top.
    fn pattern(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if y < 10 || x >= width / 2 {
                Rgb([230, 230, 230])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    #[test]
    fn size_takes_longest_edges() {
        let size = rectified_size(&quad([0.0, 0.0, 100.0, 0.0, 110.0, 60.0, -5.0, 50.0]));
        // bottom edge: 115.43 -> 115; top: 100
        assert_eq!(size.width, 115);
        // right: sqrt(100 + 3600) = 60.83 -> 61; left: sqrt(25 + 2500) = 50.25
        assert_eq!(size.height, 61);
    }

    #[test]
    fn identity_rectangle_keeps_its_size() {
        let (w, h) = (320u32, 200u32);
        let image = pattern(w, h);
        let corners = quad([0.0, 0.0, w as f64, 0.0, w as f64, h as f64, 0.0, h as f64]);

        let out = rectify(&image, &corners).unwrap();
        assert_eq!(out.dimensions(), (w, h));
        assert_eq!(out.get_pixel(w / 4, h / 2)[0], 20);
        assert_eq!(out.get_pixel(3 * w / 4, h / 2)[0], 230);
    }

    #[test]
    fn inset_region_is_stretched_to_full_canvas() {
        let image = pattern(400, 300);
        // Region x 100..300, y 50..250: dark on the left, bright on the right.
        let out = rectify(&image, &quad([100.0, 50.0, 300.0, 50.0, 300.0, 250.0, 100.0, 250.0]))
            .unwrap();
        assert_eq!(out.dimensions(), (200, 200));
        assert_eq!(out.get_pixel(20, 100)[0], 20);
        assert_eq!(out.get_pixel(180, 100)[0], 230);
    }

    #[test]
    fn collapsed_quad_is_degenerate() {
        let image = pattern(100, 100);
        let flat = quad([10.0, 50.0, 90.0, 50.0, 90.0, 50.0, 10.0, 50.0]);
        assert!(matches!(
            rectify(&image, &flat),
            Err(ScanError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn destination_spans_canvas() {
        let dst = destination(RectifiedSize::new(640, 400));
        assert_eq!(dst.top_left(), Point::new(0.0, 0.0));
        assert_eq!(dst.bottom_right(), Point::new(639.0, 399.0));
    }
}
