// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardscan capture flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Canonical, Quad, RectifiedSize};

/// Unique identifier for a verification session.
///
/// Random (v4) so that one user cannot guess another user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Face of the scanned document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    /// Capture order.
    pub const ALL: [Side; 2] = [Side::Front, Side::Back];

    /// The side captured after this one, if any.
    pub fn next(&self) -> Option<Side> {
        match self {
            Self::Front => Some(Self::Back),
            Self::Back => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Frames are still being captured or confirmation is pending.
    InProgress,
    /// Waiting for a manual review.
    Waiting,
    /// The captured portrait did not match the supplied face.
    Denied,
    /// The captured portrait matched the supplied face.
    Accepted,
}

impl SessionStatus {
    /// Keyword stored in the database and sent to callbacks.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Waiting => "WAITING",
            Self::Denied => "DENIED",
            Self::Accepted => "ACCEPTED",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "IN_PROGRESS" => Some(Self::InProgress),
            "WAITING" => Some(Self::Waiting),
            "DENIED" => Some(Self::Denied),
            "ACCEPTED" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Lock contention or a storage blip; the caller may retry.
    Transient,
    /// The user must do something (restart, finish scanning, pick a session).
    UserAction,
    /// Retrying the same input will fail again.
    Permanent,
}

/// Per-side accumulation state, owned by the session store and mutated only
/// through the consistency gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideProgress {
    pub consecutive_stable: u32,
    pub last_size: Option<RectifiedSize>,
    pub locked: Option<Quad<Canonical>>,
}

impl SideProgress {
    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }
}

/// The slice of a frame candidate the consistency gate consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub quad: Quad<Canonical>,
    pub size: RectifiedSize,
}

/// A verification session as held by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Where the final verdict is delivered.
    pub callback_url: String,
    pub requested_information: Option<String>,
    pub front: SideProgress,
    pub back: SideProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(callback_url: String, requested_information: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            status: SessionStatus::InProgress,
            callback_url,
            requested_information,
            front: SideProgress::default(),
            back: SideProgress::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn progress(&self, side: Side) -> &SideProgress {
        match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
        }
    }

    pub fn progress_mut(&mut self, side: Side) -> &mut SideProgress {
        match side {
            Side::Front => &mut self.front,
            Side::Back => &mut self.back,
        }
    }

    /// First side that has not been locked yet; `None` once both are.
    pub fn active_side(&self) -> Option<Side> {
        Side::ALL
            .into_iter()
            .find(|side| !self.progress(*side).is_locked())
    }

    pub fn is_scan_finished(&self) -> bool {
        self.active_side().is_none()
    }
}
