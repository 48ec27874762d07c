// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardscan — Core geometry, session types, configuration and errors shared
// across all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod types;

pub use config::{ConfirmationConfig, DetectorConfig, GateConfig, ScanConfig};
pub use error::{Result, ScanError};
pub use geometry::{
    CANONICAL_HEIGHT, CANONICAL_WIDTH, Canonical, CoordinateFrame, FrameScale, Point, Quad,
    RectifiedSize, Rectified, Source,
};
pub use types::*;
