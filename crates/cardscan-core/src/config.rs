// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline and service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::geometry::{CANONICAL_HEIGHT, CANONICAL_WIDTH};

/// Tuning for the frame candidate detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Width:height ratio of the centred crop (ID-1 cards are ~1.6).
    pub aspect_ratio: f64,
    /// Fraction of the frame width kept by the crop.
    pub crop_fraction: f64,
    pub canonical_width: u32,
    pub canonical_height: u32,
    /// Radius of the square closing element (2 => 5x5).
    pub close_radius: u8,
    pub close_iterations: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Radius of the disk used to thicken the edge map.
    pub dilate_radius: u8,
    /// Polygon approximation tolerance as a fraction of contour perimeter.
    pub approx_epsilon_fraction: f64,
    /// Rectified sides shorter than this are rejected as degenerate.
    pub min_rectified_side: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.6,
            crop_fraction: 1.0,
            canonical_width: CANONICAL_WIDTH,
            canonical_height: CANONICAL_HEIGHT,
            close_radius: 2,
            close_iterations: 3,
            blur_sigma: 2.0,
            canny_low: 10.0,
            canny_high: 30.0,
            dilate_radius: 2,
            approx_epsilon_fraction: 0.02,
            min_rectified_side: 8,
        }
    }
}

/// Tuning for the multi-frame consistency gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum relative per-axis size change between consecutive frames.
    pub stability_threshold: f64,
    /// Consecutive stable frames needed to lock a side.
    pub required_stable_frames: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stability_threshold: 0.1,
            required_stable_frames: 10,
        }
    }
}

/// Tuning for the final confirmation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Face embedding distances above this are denied.
    pub face_distance_threshold: f64,
    /// JPEG quality for the rectified images handed back to the client.
    pub jpeg_quality: u8,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            face_distance_threshold: 0.4,
            jpeg_quality: 90,
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub detector: DetectorConfig,
    pub gate: GateConfig,
    pub confirmation: ConfirmationConfig,
    /// SQLite session database; `None` keeps sessions in memory.
    pub database_path: Option<PathBuf>,
}

impl ScanConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detector;
        if !(d.aspect_ratio > 0.0) {
            return Err(ScanError::Config("aspect_ratio must be positive".into()));
        }
        if !(d.crop_fraction > 0.0 && d.crop_fraction <= 1.0) {
            return Err(ScanError::Config("crop_fraction must be in (0, 1]".into()));
        }
        if d.canonical_width == 0 || d.canonical_height == 0 {
            return Err(ScanError::Config("canonical size must be non-zero".into()));
        }
        if !(d.approx_epsilon_fraction > 0.0) {
            return Err(ScanError::Config(
                "approx_epsilon_fraction must be positive".into(),
            ));
        }
        if !(d.blur_sigma > 0.0) {
            return Err(ScanError::Config("blur_sigma must be positive".into()));
        }
        if !(d.canny_low >= 0.0 && d.canny_low <= d.canny_high) {
            return Err(ScanError::Config(
                "canny thresholds must satisfy 0 <= canny_low <= canny_high".into(),
            ));
        }
        if !(self.gate.stability_threshold > 0.0) {
            return Err(ScanError::Config(
                "stability_threshold must be positive".into(),
            ));
        }
        if self.gate.required_stable_frames == 0 {
            return Err(ScanError::Config(
                "required_stable_frames must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.confirmation.jpeg_quality) {
            return Err(ScanError::Config("jpeg_quality must be 1-100".into()));
        }
        Ok(())
    }
}
