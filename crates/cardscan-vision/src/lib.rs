// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardscan-vision — Frame analysis for the Cardscan capture flow.
//
// Provides the corner classifier, the perspective rectifier, and the frame
// candidate detector that finds a card boundary in one captured frame, plus
// frame decode/encode helpers and portrait extraction for confirmation.

pub mod corners;
pub mod detect;
pub mod image;
pub mod portrait;
pub mod rectify;

// Re-export the primary items so callers can use `cardscan_vision::CardDetector` etc.
pub use corners::classify;
pub use detect::{CardDetector, FrameCandidate};
pub use portrait::extract_portrait;
pub use rectify::{rectified_size, rectify};
