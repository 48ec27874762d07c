// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stand-in collaborators for headless replay: a thumbnail face comparator
// and a notifier that logs the verdict instead of posting it.

use cardscan_core::error::{Result, ScanError};
use cardscan_session::{FaceMatcher, Verdict, VerdictNotifier};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::info;

const THUMBNAIL_SIDE: u32 = 32;

/// Compares normalized grayscale thumbnails.
///
/// The distance is the RMS difference of the two thumbnails after each is
/// shifted to zero mean and scaled to unit variance, halved so it falls in
/// `[0, 1]`. It only tells near-identical crops apart from unrelated ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThumbnailMatcher;

fn normalized_thumbnail(image: &RgbImage) -> Vec<f64> {
    let gray = imageops::grayscale(image);
    let thumb = imageops::resize(&gray, THUMBNAIL_SIDE, THUMBNAIL_SIDE, FilterType::Triangle);
    let values: Vec<f64> = thumb.pixels().map(|p| f64::from(p.0[0])).collect();

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std < f64::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std).collect()
}

impl FaceMatcher for ThumbnailMatcher {
    fn distance(&self, portrait: &RgbImage, face: &RgbImage) -> Result<f64> {
        if portrait.width() == 0 || face.width() == 0 || portrait.height() == 0 || face.height() == 0 {
            return Err(ScanError::Collaborator("empty image passed to face matcher".into()));
        }
        let a = normalized_thumbnail(portrait);
        let b = normalized_thumbnail(face);
        let mse = a.iter().zip(&b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64;
        Ok((mse.sqrt() / 2.0).min(1.0))
    }
}

/// Logs the verdict payload that would be posted to the callback URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl VerdictNotifier for LogNotifier {
    fn notify(&self, verdict: &Verdict) -> Result<()> {
        let payload = serde_json::json!({ "status": verdict.status.keyword() });
        info!(
            session = %verdict.session,
            callback = %verdict.callback_url,
            face_distance = verdict.face_distance,
            %payload,
            "verdict"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(flip: bool) -> RgbImage {
        RgbImage::from_fn(64, 80, |x, _| {
            let v = (x * 4) as u8;
            Rgb([if flip { 255 - v } else { v }; 3])
        })
    }

    #[test]
    fn same_image_has_zero_distance() {
        let d = ThumbnailMatcher.distance(&gradient(false), &gradient(false)).unwrap();
        assert!(d < 1e-9);
    }

    #[test]
    fn inverted_image_is_far() {
        let d = ThumbnailMatcher.distance(&gradient(false), &gradient(true)).unwrap();
        assert!(d > 0.9, "distance {d}");
    }

    #[test]
    fn empty_image_is_an_error() {
        let err = ThumbnailMatcher
            .distance(&RgbImage::new(0, 0), &gradient(false))
            .unwrap_err();
        assert!(matches!(err, ScanError::Collaborator(_)));
    }
}
