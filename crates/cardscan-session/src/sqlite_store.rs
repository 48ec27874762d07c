// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Session store backed by SQLite.
//
// Schema:
//   corners(id INTEGER PRIMARY KEY, x1, y1, x2, y2, x3, y3, x4, y4 REAL)
//     -- canonical 640x400 coordinates, TL, TR, BR, BL
//   sessions(
//     id                    TEXT PRIMARY KEY,   -- UUID
//     status                TEXT NOT NULL,      -- IN_PROGRESS | WAITING | DENIED | ACCEPTED
//     callback_url          TEXT NOT NULL,
//     requested_information TEXT,
//     front_corners_id      INTEGER REFERENCES corners(id),
//     back_corners_id       INTEGER REFERENCES corners(id),
//     front_stable / back_stable             INTEGER  -- consecutive stable frames
//     front_last_width / front_last_height   INTEGER  -- previous rectified size
//     back_last_width / back_last_height     INTEGER
//     created_at / updated_at                TEXT     -- RFC 3339
//   )
//
// Each `update` runs in an IMMEDIATE transaction, so the write lock is taken
// before the record is read and two writers can never interleave. On a file
// database `get` uses pooled read-only connections; under WAL those read the
// last committed state without waiting for the writer.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use cardscan_core::error::{Result, ScanError};
use cardscan_core::{
    Canonical, Quad, RectifiedSize, SessionId, SessionRecord, SessionStatus, Side, SideProgress,
};
use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Row, TransactionBehavior, params,
};
use tracing::{debug, info, instrument};

use crate::store::SessionStore;

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS corners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        x1 REAL NOT NULL,
        y1 REAL NOT NULL,
        x2 REAL NOT NULL,
        y2 REAL NOT NULL,
        x3 REAL NOT NULL,
        y3 REAL NOT NULL,
        x4 REAL NOT NULL,
        y4 REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        callback_url TEXT NOT NULL,
        requested_information TEXT,
        front_corners_id INTEGER REFERENCES corners(id),
        back_corners_id INTEGER REFERENCES corners(id),
        front_stable INTEGER NOT NULL DEFAULT 0,
        front_last_width INTEGER,
        front_last_height INTEGER,
        back_stable INTEGER NOT NULL DEFAULT 0,
        back_last_width INTEGER,
        back_last_height INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

const SELECT_SESSION_SQL: &str = r#"
    SELECT id, status, callback_url, requested_information,
           front_corners_id, back_corners_id,
           front_stable, front_last_width, front_last_height,
           back_stable, back_last_width, back_last_height,
           created_at, updated_at
    FROM sessions WHERE id = ?1
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 4;

/// Convert a `rusqlite::Error`, surfacing lock contention as a retriable conflict.
fn db_err(context: &str, e: rusqlite::Error) -> ScanError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            ScanError::Conflict(format!("{context}: {e}"))
        }
        _ => ScanError::Database(format!("{context}: {e}")),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ScanError::Database(format!("bad timestamp {raw:?}: {e}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| ScanError::Database(format!("{column} out of range: {value}")))
}

/// Raw `sessions` row before corner lookup.
struct SessionRow {
    id: String,
    status: String,
    callback_url: String,
    requested_information: Option<String>,
    corner_ids: [Option<i64>; 2],
    stable: [i64; 2],
    last_width: [Option<i64>; 2],
    last_height: [Option<i64>; 2],
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            status: row.get(1)?,
            callback_url: row.get(2)?,
            requested_information: row.get(3)?,
            corner_ids: [row.get(4)?, row.get(5)?],
            stable: [row.get(6)?, row.get(9)?],
            last_width: [row.get(7)?, row.get(10)?],
            last_height: [row.get(8)?, row.get(11)?],
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

fn load_corners(conn: &Connection, corners_id: i64) -> Result<Quad<Canonical>> {
    conn.query_row(
        "SELECT x1, y1, x2, y2, x3, y3, x4, y4 FROM corners WHERE id = ?1",
        params![corners_id],
        |row| {
            let mut coords = [0.0f64; 8];
            for (i, c) in coords.iter_mut().enumerate() {
                *c = row.get(i)?;
            }
            Ok(Quad::from_coords(coords))
        },
    )
    .map_err(|e| db_err("load corners", e))
}

fn insert_corners(conn: &Connection, quad: &Quad<Canonical>) -> Result<i64> {
    let c = quad.to_coords();
    conn.execute(
        "INSERT INTO corners (x1, y1, x2, y2, x3, y3, x4, y4)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]],
    )
    .map_err(|e| db_err("insert corners", e))?;
    Ok(conn.last_insert_rowid())
}

fn load_record(conn: &Connection, id: SessionId) -> Result<(SessionRecord, [Option<i64>; 2])> {
    let row = conn
        .query_row(SELECT_SESSION_SQL, params![id.to_string()], SessionRow::from_row)
        .optional()
        .map_err(|e| db_err("load session", e))?
        .ok_or(ScanError::SessionNotFound(id))?;

    let status = SessionStatus::from_keyword(&row.status)
        .ok_or_else(|| ScanError::Database(format!("unknown status {:?}", row.status)))?;

    let mut sides = [SideProgress::default(); 2];
    for (i, progress) in sides.iter_mut().enumerate() {
        progress.consecutive_stable = to_u32(row.stable[i], "stable count")?;
        progress.last_size = match (row.last_width[i], row.last_height[i]) {
            (Some(w), Some(h)) => Some(RectifiedSize::new(
                to_u32(w, "last width")?,
                to_u32(h, "last height")?,
            )),
            _ => None,
        };
        progress.locked = row.corner_ids[i]
            .map(|corners_id| load_corners(conn, corners_id))
            .transpose()?;
    }

    let record = SessionRecord {
        id: row
            .id
            .parse::<SessionId>()
            .map_err(|e| ScanError::Database(format!("bad session id {:?}: {e}", row.id)))?,
        status,
        callback_url: row.callback_url,
        requested_information: row.requested_information,
        front: sides[0],
        back: sides[1],
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    };
    Ok((record, row.corner_ids))
}

/// Write `record` over its row, replacing a side's corners only when they changed.
fn store_record(
    conn: &Connection,
    before: &SessionRecord,
    corner_ids: [Option<i64>; 2],
    record: &SessionRecord,
) -> Result<()> {
    let mut new_ids = corner_ids;
    let mut stale = Vec::new();
    for (i, side) in Side::ALL.into_iter().enumerate() {
        let locked = record.progress(side).locked;
        if locked == before.progress(side).locked {
            continue;
        }
        stale.extend(corner_ids[i]);
        new_ids[i] = locked.map(|quad| insert_corners(conn, &quad)).transpose()?;
    }

    let size = |side: Side| record.progress(side).last_size;
    conn.execute(
        "UPDATE sessions SET
            status = ?2, callback_url = ?3, requested_information = ?4,
            front_corners_id = ?5, back_corners_id = ?6,
            front_stable = ?7, front_last_width = ?8, front_last_height = ?9,
            back_stable = ?10, back_last_width = ?11, back_last_height = ?12,
            updated_at = ?13
         WHERE id = ?1",
        params![
            record.id.to_string(),
            record.status.keyword(),
            record.callback_url,
            record.requested_information,
            new_ids[0],
            new_ids[1],
            i64::from(record.front.consecutive_stable),
            size(Side::Front).map(|s| i64::from(s.width)),
            size(Side::Front).map(|s| i64::from(s.height)),
            i64::from(record.back.consecutive_stable),
            size(Side::Back).map(|s| i64::from(s.width)),
            size(Side::Back).map(|s| i64::from(s.height)),
            record.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| db_err("update session", e))?;

    // Only once nothing references them.
    for corners_id in stale {
        conn.execute("DELETE FROM corners WHERE id = ?1", params![corners_id])
            .map_err(|e| db_err("delete corners", e))?;
    }
    Ok(())
}

/// SQLite-backed [`SessionStore`].
///
/// Writes go through one connection guarded by a mutex. Reads of a file
/// database run on their own connections and proceed in parallel. The file
/// may be shared with other processes, in which case contention shows up as
/// [`ScanError::Conflict`] once the busy timeout expires.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases, which only the writer can see.
    path: Option<PathBuf>,
    readers: Mutex<Vec<Connection>>,
}

impl SqliteSessionStore {
    /// Open (or create) the session database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;
        let mut store = Self::init(conn)?;
        store.path = Some(path.as_ref().to_path_buf());
        info!("session database opened");
        Ok(store)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        let store = Self::init(conn)?;
        debug!("in-memory session database opened");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| db_err("busy timeout", e))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| db_err("foreign keys pragma", e))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| db_err("create tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            readers: Mutex::new(Vec::new()),
        })
    }

    fn checkout_reader(&self, path: &Path) -> Result<Connection> {
        if let Some(conn) = self.readers.lock().ok().and_then(|mut idle| idle.pop()) {
            return Ok(conn);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| db_err("open reader", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| db_err("busy timeout", e))?;
        debug!("read connection opened");
        Ok(conn)
    }

    fn checkin_reader(&self, conn: Connection) {
        if let Ok(mut idle) = self.readers.lock() {
            if idle.len() < MAX_IDLE_READERS {
                idle.push(conn);
            }
        }
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScanError::Database("connection lock poisoned".into()))
    }
}

impl SessionStore for SqliteSessionStore {
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
        self.conn()?
            .execute(
                "INSERT INTO sessions (id, status, callback_url, requested_information,
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.status.keyword(),
                    record.callback_url,
                    record.requested_information,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| db_err("insert session", e))?;
        debug!(id = %record.id, "session created");
        Ok(record)
    }

    fn get(&self, id: SessionId) -> Result<SessionRecord> {
        let Some(path) = &self.path else {
            let conn = self.conn()?;
            return load_record(&conn, id).map(|(record, _)| record);
        };

        let mut conn = self.checkout_reader(path)?;
        // One read transaction so the row and its corners come from the same snapshot.
        let result = conn
            .transaction()
            .map_err(|e| db_err("begin read", e))
            .and_then(|tx| load_record(&tx, id).map(|(record, _)| record));
        self.checkin_reader(conn);
        result
    }

    #[instrument(skip(self), fields(%id))]
    fn delete(&self, id: SessionId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| db_err("begin", e))?;

        let (_, corner_ids) = load_record(&tx, id)?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])
            .map_err(|e| db_err("delete session", e))?;
        for corners_id in corner_ids.into_iter().flatten() {
            tx.execute("DELETE FROM corners WHERE id = ?1", params![corners_id])
                .map_err(|e| db_err("delete corners", e))?;
        }

        tx.commit().map_err(|e| db_err("commit", e))?;
        debug!("session deleted");
        Ok(())
    }

    fn update(
        &self,
        id: SessionId,
        f: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| db_err("begin", e))?;

        let (before, corner_ids) = load_record(&tx, id)?;
        let mut record = before.clone();
        // Dropping `tx` on error rolls back.
        f(&mut record)?;
        record.updated_at = Utc::now();
        store_record(&tx, &before, corner_ids, &record)?;

        tx.commit().map_err(|e| db_err("commit", e))?;
        Ok(record)
    }
}
