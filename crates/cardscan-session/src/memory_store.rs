// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process session store. Updates hold the map read lock plus the
// session's own mutex, so frames for different sessions never wait on each
// other while `delete` (which needs the write lock) waits for in-flight
// updates to commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use cardscan_core::error::{Result, ScanError};
use cardscan_core::{SessionId, SessionRecord};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::store::SessionStore;

fn poisoned<T>(_: T) -> ScanError {
    ScanError::Database("session lock poisoned".into())
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionRecord>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: SessionId) -> Result<Arc<Mutex<SessionRecord>>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .get(&id)
            .cloned()
            .ok_or(ScanError::SessionNotFound(id))
    }
}

impl SessionStore for MemorySessionStore {
    #[instrument(skip_all)]
    fn create(
        &self,
        callback_url: &str,
        requested_information: Option<&str>,
    ) -> Result<SessionRecord> {
        let record = SessionRecord::new(
            callback_url.to_string(),
            requested_information.map(str::to_string),
        );
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(record.id, Arc::new(Mutex::new(record.clone())));
        debug!(id = %record.id, "session created");
        Ok(record)
    }

    fn get(&self, id: SessionId) -> Result<SessionRecord> {
        let slot = self.slot(id)?;
        let record = slot.lock().map_err(poisoned)?;
        Ok(record.clone())
    }

    #[instrument(skip(self), fields(%id))]
    fn delete(&self, id: SessionId) -> Result<()> {
        self.sessions
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .map(|_| debug!("session deleted"))
            .ok_or(ScanError::SessionNotFound(id))
    }

    fn update(
        &self,
        id: SessionId,
        f: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord> {
        // The read guard stays alive until commit so the session cannot be
        // removed between lookup and write.
        let sessions = self.sessions.read().map_err(poisoned)?;
        let slot = sessions.get(&id).ok_or(ScanError::SessionNotFound(id))?;
        let mut record = slot.lock().map_err(poisoned)?;

        // Work on a copy so a failing closure leaves the session untouched.
        let mut draft = record.clone();
        f(&mut draft)?;
        draft.updated_at = Utc::now();
        *record = draft;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn create_then_get() {
        contract::create_then_get(&MemorySessionStore::new());
    }

    #[test]
    fn unknown_session_is_not_found() {
        contract::unknown_session_is_not_found(&MemorySessionStore::new());
    }

    #[test]
    fn progress_round_trips() {
        contract::progress_round_trips(&MemorySessionStore::new());
    }

    #[test]
    fn corners_and_status_persist() {
        contract::corners_and_status_persist(&MemorySessionStore::new());
    }

    #[test]
    fn failed_update_writes_nothing() {
        contract::failed_update_writes_nothing(&MemorySessionStore::new());
    }

    #[test]
    fn delete_removes_session() {
        let store = MemorySessionStore::new();
        contract::delete_removes_session(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_updates_serialize() {
        contract::concurrent_updates_serialize(&MemorySessionStore::new());
    }

    #[test]
    fn sessions_are_independent() {
        let store = MemorySessionStore::new();
        let a = store.create("https://example.test/a", None).unwrap().id;
        let b = store.create("https://example.test/b", None).unwrap().id;

        store
            .update(a, &mut |record| {
                record.front.consecutive_stable = 3;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get(a).unwrap().front.consecutive_stable, 3);
        assert_eq!(store.get(b).unwrap().front.consecutive_stable, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn delete_waits_for_in_flight_update() {
        use std::sync::mpsc;

        let owned = MemorySessionStore::new();
        let store = &owned;
        let id = store.create("https://example.test/cb", None).unwrap().id;
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let updater = scope.spawn(move || {
                store.update(id, &mut |record| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    record.front.consecutive_stable = 5;
                    Ok(())
                })
            });

            entered_rx.recv().unwrap();
            let deleter = scope.spawn(move || store.delete(id));
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!deleter.is_finished());

            release_tx.send(()).unwrap();
            let committed = updater.join().unwrap().unwrap();
            assert_eq!(committed.front.consecutive_stable, 5);
            deleter.join().unwrap().unwrap();
        });

        assert!(matches!(store.get(id), Err(ScanError::SessionNotFound(_))));
        assert!(store.is_empty());
    }
}
