// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session store boundary — where per-session capture state lives between
// frames.
//
// Every frame of a session is a read-modify-write of that session's record,
// and frames from one client may arrive concurrently. `update` is the only
// primitive that must be atomic per session; the convenience methods are
// expressed through it.

use cardscan_core::error::Result;
use cardscan_core::{Canonical, Quad, SessionId, SessionRecord, SessionStatus, Side, SideProgress};

/// Persistent (or in-process) home of session records.
pub trait SessionStore: Send + Sync {
    /// Create a fresh `IN_PROGRESS` session.
    fn create(
        &self,
        callback_url: &str,
        requested_information: Option<&str>,
    ) -> Result<SessionRecord>;

    /// Snapshot of one session.
    fn get(&self, id: SessionId) -> Result<SessionRecord>;

    /// Remove a session and its locked corners.
    fn delete(&self, id: SessionId) -> Result<()>;

    /// Apply `f` to the session atomically and return the committed record.
    ///
    /// Concurrent `update`s on the same session are serialized. If `f`
    /// returns an error nothing is written.
    fn update(
        &self,
        id: SessionId,
        f: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord>;

    fn load_side_progress(&self, id: SessionId, side: Side) -> Result<SideProgress> {
        Ok(*self.get(id)?.progress(side))
    }

    fn save_side_progress(&self, id: SessionId, side: Side, progress: &SideProgress) -> Result<()> {
        let progress = *progress;
        self.update(id, &mut |record| {
            *record.progress_mut(side) = progress;
            Ok(())
        })?;
        Ok(())
    }

    /// Persist the locked corners of `side`, resetting its counter.
    fn lock_corners(&self, id: SessionId, side: Side, quad: &Quad<Canonical>) -> Result<()> {
        let quad = *quad;
        self.update(id, &mut |record| {
            let progress = record.progress_mut(side);
            progress.locked = Some(quad);
            progress.consecutive_stable = 0;
            Ok(())
        })?;
        Ok(())
    }

    fn set_status(&self, id: SessionId, status: SessionStatus) -> Result<()> {
        self.update(id, &mut |record| {
            record.status = status;
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store must show, run against each implementation.

    use super::*;
    use cardscan_core::{RectifiedSize, ScanError};

    fn quad() -> Quad<Canonical> {
        Quad::from_coords([12.5, 20.0, 600.0, 22.0, 598.0, 380.0, 10.0, 377.5])
    }

    pub fn create_then_get(store: &dyn SessionStore) {
        let created = store
            .create("https://example.test/cb", Some("name,dob"))
            .unwrap();
        let loaded = store.get(created.id).unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.status, SessionStatus::InProgress);
        assert_eq!(loaded.callback_url, "https://example.test/cb");
        assert_eq!(loaded.requested_information.as_deref(), Some("name,dob"));
        assert_eq!(loaded.front, SideProgress::default());
        assert_eq!(loaded.back, SideProgress::default());
    }

    pub fn unknown_session_is_not_found(store: &dyn SessionStore) {
        let id = SessionId::new();
        assert!(matches!(store.get(id), Err(ScanError::SessionNotFound(x)) if x == id));
        assert!(matches!(
            store.update(id, &mut |_| Ok(())),
            Err(ScanError::SessionNotFound(_))
        ));
    }

    pub fn progress_round_trips(store: &dyn SessionStore) {
        let id = store.create("https://example.test/cb", None).unwrap().id;
        let progress = SideProgress {
            consecutive_stable: 7,
            last_size: Some(RectifiedSize::new(881, 479)),
            locked: None,
        };
        store.save_side_progress(id, Side::Back, &progress).unwrap();

        assert_eq!(store.load_side_progress(id, Side::Back).unwrap(), progress);
        assert_eq!(
            store.load_side_progress(id, Side::Front).unwrap(),
            SideProgress::default()
        );
    }

    pub fn corners_and_status_persist(store: &dyn SessionStore) {
        let id = store.create("https://example.test/cb", None).unwrap().id;
        store.lock_corners(id, Side::Front, &quad()).unwrap();
        store.set_status(id, SessionStatus::Accepted).unwrap();

        let record = store.get(id).unwrap();
        assert_eq!(record.front.locked, Some(quad()));
        assert_eq!(record.front.consecutive_stable, 0);
        assert!(record.back.locked.is_none());
        assert_eq!(record.status, SessionStatus::Accepted);
        assert_eq!(record.active_side(), Some(Side::Back));
    }

    pub fn failed_update_writes_nothing(store: &dyn SessionStore) {
        let id = store.create("https://example.test/cb", None).unwrap().id;
        let err = store
            .update(id, &mut |record| {
                record.front.consecutive_stable = 99;
                Err(ScanError::InvalidRequest("nope".into()))
            })
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidRequest(_)));
        assert_eq!(store.get(id).unwrap().front.consecutive_stable, 0);
    }

    pub fn delete_removes_session(store: &dyn SessionStore) {
        let id = store.create("https://example.test/cb", None).unwrap().id;
        store.lock_corners(id, Side::Front, &quad()).unwrap();
        store.delete(id).unwrap();
        assert!(matches!(store.get(id), Err(ScanError::SessionNotFound(_))));
        assert!(matches!(store.delete(id), Err(ScanError::SessionNotFound(_))));
    }

    /// Many threads incrementing one session's counter must not lose updates.
    pub fn concurrent_updates_serialize(store: &dyn SessionStore) {
        let id = store.create("https://example.test/cb", None).unwrap().id;
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        loop {
                            let result = store.update(id, &mut |record| {
                                record.front.consecutive_stable += 1;
                                Ok(())
                            });
                            match result {
                                Ok(_) => break,
                                Err(err) if err.is_retriable() => continue,
                                Err(err) => panic!("update failed: {err}"),
                            }
                        }
                    }
                });
            }
        });
        assert_eq!(store.get(id).unwrap().front.consecutive_stable, 200);
    }
}
