// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language messages for the person holding the card.
//
// Every technical error is mapped to a short message with a concrete
// suggestion, and every per-frame capture stage gets a one-line hint for
// the capture screen.

use crate::error::ScanError;
use crate::types::{ErrorClass, Side};

/// A human-readable error with plain message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether the client may resubmit automatically.
    pub retriable: bool,
    pub class: ErrorClass,
}

/// Convert a `ScanError` into something a person at the camera can act on.
pub fn humanize_error(err: &ScanError) -> HumanError {
    let (message, suggestion) = match err {
        ScanError::ImageDecode(_) => (
            "We couldn't read that picture.".to_string(),
            "Check that the camera is working and try again.".to_string(),
        ),
        ScanError::ImageEncode(_) => (
            "We couldn't prepare the scanned image.".to_string(),
            "Please try the scan again.".to_string(),
        ),
        ScanError::Precondition { .. } => (
            "The camera picture is the wrong shape.".to_string(),
            "Hold the phone sideways (landscape) so the card fits the frame.".to_string(),
        ),
        ScanError::DegenerateGeometry(_) => (
            "We couldn't see the card's edges clearly.".to_string(),
            "Place the card flat on a dark, plain surface.".to_string(),
        ),
        ScanError::SessionNotFound(_) => (
            "This verification link has expired.".to_string(),
            "Go back to the site that sent you here and start again.".to_string(),
        ),
        ScanError::ScanAlreadyFinished(_) => (
            "Both sides of your card are already scanned.".to_string(),
            "Continue to the next step, or restart if something looks wrong.".to_string(),
        ),
        ScanError::ScanNotFinished(_) => (
            "We still need both sides of your card.".to_string(),
            "Finish scanning the front and back first.".to_string(),
        ),
        ScanError::InvalidRequest(detail) => (
            "Something was missing from the request.".to_string(),
            format!("Please try again. ({detail})"),
        ),
        ScanError::Conflict(_) | ScanError::Database(_) | ScanError::Io(_) => (
            "We're a little busy right now.".to_string(),
            "Wait a moment; we'll try again automatically.".to_string(),
        ),
        ScanError::Serialization(_) | ScanError::Config(_) => (
            "Something went wrong on our side.".to_string(),
            "Please try again later.".to_string(),
        ),
        ScanError::Collaborator(_) => (
            "We couldn't finish checking your card.".to_string(),
            "Please try again in a few minutes.".to_string(),
        ),
    };

    HumanError {
        message,
        suggestion,
        retriable: err.is_retriable(),
        class: err.class(),
    }
}

/// Where the capture flow stands after one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    /// No card boundary in this frame.
    NoCard { side: Side },
    /// A card is visible; `stable` of `required` steady frames so far.
    Steadying { side: Side, stable: u32, required: u32 },
    /// The card moved too much since the previous frame.
    Moved { side: Side },
    /// This side just locked.
    SideCaptured { side: Side },
    /// Both sides are captured.
    Complete,
}

/// One-line hint for the capture screen.
pub fn capture_hint(stage: &CaptureStage) -> String {
    match *stage {
        CaptureStage::NoCard { side } => {
            format!("Show the {side} of your card inside the frame.")
        }
        CaptureStage::Steadying {
            stable, required, ..
        } => format!("Hold steady... {stable}/{required}"),
        CaptureStage::Moved { .. } => "Keep the card still.".to_string(),
        CaptureStage::SideCaptured { side } => match side.next() {
            Some(next) => format!("Got the {side}! Now turn the card over to the {next}."),
            None => "Got both sides!".to_string(),
        },
        CaptureStage::Complete => "Scan complete.".to_string(),
    }
}
