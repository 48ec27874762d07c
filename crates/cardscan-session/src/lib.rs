// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cardscan-session — Multi-frame consistency gate and session state.
//
// The gate decides when a side's card boundary has held still long enough to
// lock. Session stores keep that state between frames (in memory or in
// SQLite), and `ScanService` drives the whole capture and confirmation flow.

pub mod gate;
pub mod memory_store;
pub mod service;
pub mod sqlite_store;
pub mod store;

pub use gate::{GateTransition, GateUpdate, advance, restart};
pub use memory_store::MemorySessionStore;
pub use service::{
    Confirmation, FaceMatcher, FrameOutcome, MrzReader, ScanService, Verdict, VerdictNotifier,
};
pub use sqlite_store::SqliteSessionStore;
pub use store::SessionStore;
