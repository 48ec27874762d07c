// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardscan.

use thiserror::Error;

use crate::types::{ErrorClass, SessionId};

/// Top-level error type for all Cardscan operations.
///
/// "No card in this frame" is not an error; the detector reports it as
/// `Ok(None)`.
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Frame pipeline --
    #[error("failed to decode frame: {0}")]
    ImageDecode(String),

    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    #[error(
        "frame {width}x{height} is too short for the card crop (needs {required_height} rows)"
    )]
    Precondition {
        width: u32,
        height: u32,
        required_height: u32,
    },

    #[error("degenerate card geometry: {0}")]
    DegenerateGeometry(String),

    // -- Session flow --
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("scan for session {0} is already finished")]
    ScanAlreadyFinished(SessionId),

    #[error("scan for session {0} is not finished")]
    ScanNotFinished(SessionId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- Storage / persistence --
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    // -- External collaborators (face matching, MRZ, callbacks) --
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}

impl ScanError {
    /// How the caller should react to this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Conflict(_) | Self::Database(_) | Self::Io(_) | Self::Collaborator(_) => {
                ErrorClass::Transient
            }
            Self::SessionNotFound(_)
            | Self::ScanAlreadyFinished(_)
            | Self::ScanNotFinished(_)
            | Self::InvalidRequest(_) => ErrorClass::UserAction,
            Self::ImageDecode(_)
            | Self::ImageEncode(_)
            | Self::Precondition { .. }
            | Self::DegenerateGeometry(_)
            | Self::Serialization(_)
            | Self::Config(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
