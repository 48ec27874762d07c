// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame ingestion and output helpers — decode, centred crop, exact resize,
// and JPEG encoding of in-memory images using the `image` crate.

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use cardscan_core::error::{Result, ScanError};
use tracing::{debug, instrument};

/// A centred crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    /// Centre a window of `aspect_ratio` (width:height) spanning
    /// `crop_fraction` of the frame width.
    ///
    /// The height is the width divided by the ratio, rounded down. A frame
    /// too short for that height is a hard precondition failure, not a
    /// missed frame.
    pub fn centered(
        frame_width: u32,
        frame_height: u32,
        aspect_ratio: f64,
        crop_fraction: f64,
    ) -> Result<Self> {
        let width = (f64::from(frame_width) * crop_fraction).round() as u32;
        let height = (f64::from(width) / aspect_ratio).floor() as u32;

        if height > frame_height || width == 0 || height == 0 {
            return Err(ScanError::Precondition {
                width: frame_width,
                height: frame_height,
                required_height: height.max(1),
            });
        }

        Ok(Self {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        })
    }
}

/// Decode one encoded raster frame (JPEG, PNG, ...) into RGB pixels.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode_frame(data: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(data).map_err(|err| {
        ScanError::ImageDecode(format!("failed to decode frame: {}", err))
    })?;
    debug!(
        width = img.width(),
        height = img.height(),
        "Frame decoded from bytes"
    );
    Ok(img.to_rgb8())
}

/// Copy out the pixels under `window`.
pub fn crop(image: &RgbImage, window: CropWindow) -> RgbImage {
    imageops::crop_imm(image, window.x, window.y, window.width, window.height).to_image()
}

/// Resize to exactly `width` x `height`, ignoring aspect ratio.
pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Encode as JPEG bytes with the given quality (1-100).
pub fn to_jpeg_bytes(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    image.write_with_encoder(encoder).map_err(|err| {
        ScanError::ImageEncode(format!("JPEG encoding failed: {}", err))
    })?;
    Ok(buffer)
}

/// Encode as PNG bytes.
pub fn to_png_bytes(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, ImageFormat::Png).map_err(|err| {
        ScanError::ImageEncode(format!("PNG encoding failed: {}", err))
    })?;
    Ok(buffer)
}
