//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file, URI or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Connection strings are opened with URI support, so `file:` targets and
//!   `vfs=memdb` parameters are honoured.

use super::DbTarget;
use crate::error::DboResult;
use log::{debug, error};
use rusqlite::{Connection, OpenFlags};
use std::time::{Duration, Instant};

/// Upper bound on waiting for another connection's lock.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Opens and configures one connection to `target`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub(crate) fn open_connection(target: &DbTarget) -> DboResult<Connection> {
    let started_at = Instant::now();
    let mode = target.mode();

    let opened = match target {
        DbTarget::File(path) => Connection::open_with_flags(path, open_flags()),
        DbTarget::Uri(uri) => Connection::open_with_flags(uri, open_flags()),
    };

    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn) {
        Ok(()) => {
            debug!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

pub(super) fn bootstrap_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::open_connection;
    use crate::db::DbTarget;

    #[test]
    fn opened_connections_enforce_foreign_keys() {
        let target = DbTarget::parse(":memory:").unwrap();
        let conn = open_connection(&target).unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn memory_target_is_shared_between_connections() {
        let target = DbTarget::parse(":memory:").unwrap();
        let first = open_connection(&target).unwrap();
        first
            .execute_batch("CREATE TABLE shared (id INTEGER PRIMARY KEY);")
            .unwrap();
        let second = open_connection(&target).unwrap();
        let count: i64 = second
            .query_row("SELECT COUNT(*) FROM shared;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn memory_target_lets_readers_past_an_open_writer() {
        let target = DbTarget::parse(":memory:").unwrap();
        let writer = open_connection(&target).unwrap();
        writer
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); BEGIN; INSERT INTO t VALUES (1);")
            .unwrap();

        let reader = open_connection(&target).unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM t;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        writer.execute_batch("COMMIT;").unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM t;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn file_target_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open.db");
        let target = DbTarget::File(path.clone());
        drop(open_connection(&target).unwrap());
        assert!(path.exists());
    }
}
