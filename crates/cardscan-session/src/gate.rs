// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Consistency gate — decides, frame by frame, when a side's detected card
// boundary has been steady long enough to lock.
//
// The gate is a pure function of (progress, observation). The session store
// owns the progress value and swaps in the returned one atomically.
//
// Per side:
//
//   EMPTY --first observation--> ACCUMULATING --N stable frames--> LOCKED
//                                  ^        |
//                                  +-unstable (count := 0)
//
// A frame is stable when both rectified dimensions changed by less than the
// threshold relative to the immediately preceding observation.

use cardscan_core::{
    Canonical, GateConfig, Observation, Quad, SessionRecord, Side, SideProgress,
};
use tracing::{debug, info};

/// What one observation did to a side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateTransition {
    /// No candidate this frame, or the side is already locked. Nothing changed.
    Skipped,
    /// First candidate of a run; its size is now the reference.
    Recorded,
    /// Within tolerance of the previous frame.
    Stable { count: u32 },
    /// Outside tolerance; the count went back to zero.
    Reset,
    /// The required run was reached; these corners are now locked.
    Locked(Quad<Canonical>),
}

/// The new progress value plus what happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateUpdate {
    pub progress: SideProgress,
    pub transition: GateTransition,
}

impl GateUpdate {
    pub fn locked(&self) -> bool {
        matches!(self.transition, GateTransition::Locked(_))
    }
}

/// Feed one frame's observation (or its absence) to a side.
pub fn advance(
    progress: &SideProgress,
    observation: Option<&Observation>,
    config: &GateConfig,
) -> GateUpdate {
    let unchanged = GateUpdate {
        progress: *progress,
        transition: GateTransition::Skipped,
    };

    let Some(observation) = observation else {
        return unchanged;
    };
    if progress.is_locked() {
        return unchanged;
    }

    let mut next = *progress;
    next.last_size = Some(observation.size);

    let Some(previous) = progress.last_size else {
        debug!(size = %observation.size, "reference size recorded");
        return GateUpdate {
            progress: next,
            transition: GateTransition::Recorded,
        };
    };

    let (dw, dh) = observation.size.relative_change(&previous);
    if dw >= config.stability_threshold || dh >= config.stability_threshold {
        debug!(%previous, current = %observation.size, dw, dh, "size jumped; count reset");
        next.consecutive_stable = 0;
        return GateUpdate {
            progress: next,
            transition: GateTransition::Reset,
        };
    }

    next.consecutive_stable += 1;
    if next.consecutive_stable >= config.required_stable_frames {
        info!(quad = %observation.quad, "stable run complete; corners locked");
        next.consecutive_stable = 0;
        next.locked = Some(observation.quad);
        return GateUpdate {
            progress: next,
            transition: GateTransition::Locked(observation.quad),
        };
    }

    debug!(count = next.consecutive_stable, dw, dh, "stable frame");
    GateUpdate {
        progress: next,
        transition: GateTransition::Stable {
            count: next.consecutive_stable,
        },
    }
}

/// Undo the most recent lock and any in-flight accumulation.
///
/// While the back is still open, the front lock is discarded too and both
/// sides start over from the front. Once the back is locked, only the back
/// is redone. Returns the side that capture resumes on.
pub fn restart(record: &mut SessionRecord) -> Side {
    let back_locked = record.back.is_locked();
    record.back = SideProgress::default();
    if back_locked {
        return Side::Back;
    }
    // Back was still open: the front lock goes too.
    record.front = SideProgress::default();
    Side::Front
}
