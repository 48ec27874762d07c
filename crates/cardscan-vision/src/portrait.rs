// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Portrait region of a rectified card front.

use image::{RgbImage, imageops};

/// Fractional bounds of the holder photo on the card front
/// (`x0, x1, y0, y1`), for the 2024 Bulgarian ID card layout.
pub const PORTRAIT_REGION: (f64, f64, f64, f64) = (0.02, 0.39, 0.20, 0.96);

/// Cut the holder photo out of a rectified card front.
pub fn extract_portrait(card_front: &RgbImage) -> RgbImage {
    let (width, height) = (f64::from(card_front.width()), f64::from(card_front.height()));
    let (x0, x1, y0, y1) = PORTRAIT_REGION;

    let left = (x0 * width) as u32;
    let right = (x1 * width) as u32;
    let top = (y0 * height) as u32;
    let bottom = (y1 * height) as u32;

    imageops::crop_imm(card_front, left, top, right - left, bottom - top).to_image()
}
