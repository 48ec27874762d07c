// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — frame decode/encode, centred crop and resize.

pub mod processor;

pub use processor::{CropWindow, decode_frame, to_jpeg_bytes};
