//! Sessions: one pooled connection, an optional open transaction, and
//! transient filter state.
//!
//! # Responsibility
//! - Execute statements against the session's connection with deadline and
//!   closed-transaction checks.
//! - Own the per-call filter state built by the query composer.
//! - Emit statement-level log events according to the configured level.
//!
//! # Invariants
//! - Filter state is reset at the start of every CRUD call.
//! - Once the transaction executor closes a session, every further statement
//!   through any clone of it fails with `Canceled`.
//! - The connection is shared only between the executor and the single unit
//!   of work it dispatched; statements are serialised by a mutex.
//! - A statement never waits on another connection's lock past the session
//!   deadline.
//! - A transaction left open when the last handle drops is rolled back before
//!   the connection returns to the pool.

mod filter;

pub use filter::FilterState;

use crate::condition::Condition;
use crate::config::LogLevel;
use crate::context::Context;
use crate::db::{PooledConnection, BUSY_TIMEOUT};
use crate::entity::Entity;
use crate::error::{DboError, DboResult};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, InterruptHandle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Statement logging settings copied from the owning handle's config.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatementLog {
    pub level: LogLevel,
    pub slow_threshold: Duration,
}

struct SharedConnection {
    id: Uuid,
    conn: Mutex<PooledConnection>,
    interrupt: InterruptHandle,
    in_transaction: AtomicBool,
    closed: AtomicBool,
    statements: AtomicU64,
    log: StatementLog,
}

/// Handle to a live connection or an open transaction.
pub struct Session {
    shared: Arc<SharedConnection>,
    ctx: Context,
    filter: FilterState,
}

impl Session {
    pub(crate) fn new(conn: PooledConnection, ctx: Context, log: StatementLog) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            shared: Arc::new(SharedConnection {
                id: Uuid::new_v4(),
                conn: Mutex::new(conn),
                interrupt,
                in_transaction: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                statements: AtomicU64::new(0),
                log,
            }),
            ctx,
            filter: FilterState::default(),
        }
    }

    /// Returns a second handle on the same connection and transaction with
    /// its own, empty filter state.
    pub(crate) fn share(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            ctx: self.ctx,
            filter: FilterState::default(),
        }
    }

    /// Stable identifier used to correlate log events.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn in_transaction(&self) -> bool {
        self.shared.in_transaction.load(Ordering::SeqCst)
    }

    /// Returns whether the transaction executor already resolved this session.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of statements executed through this session and its clones.
    pub fn statements_executed(&self) -> u64 {
        self.shared.statements.load(Ordering::SeqCst)
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Clears predicates, ordering and paging.
    pub fn reset_condition(&mut self) -> &mut Self {
        self.filter = FilterState::default();
        self
    }

    /// Resets the filter state, then applies predicates, ordering and paging
    /// from `condition`.
    pub fn compose<C: Condition + ?Sized>(&mut self, condition: &C) -> &mut Self {
        self.filter = FilterState::compose(condition);
        self
    }

    /// Resets the filter state, then applies predicates only.
    pub fn compose_predicates<C: Condition + ?Sized>(&mut self, condition: &C) -> &mut Self {
        self.filter = FilterState::compose_predicates(condition);
        self
    }

    /// Executes one statement and returns the affected-row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DboResult<usize> {
        self.run(sql, |conn| conn.execute(sql, params_from_iter(params.iter())), |rows| *rows)
    }

    /// Executes a batch of statements without parameters, e.g. DDL.
    pub fn execute_batch(&self, sql: &str) -> DboResult<()> {
        self.run(sql, |conn| conn.execute_batch(sql), |_| 0)
    }

    /// Runs a query and maps every row into `E`.
    pub fn fetch_all<E: Entity>(&self, sql: &str, params: &[Value]) -> DboResult<Vec<E>> {
        self.run(
            sql,
            |conn| {
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map(params_from_iter(params.iter()), E::from_row)?;
                let entities = rows.collect::<rusqlite::Result<Vec<E>>>();
                entities
            },
            |entities: &Vec<E>| entities.len(),
        )
    }

    /// Runs a query expected to produce exactly one row.
    ///
    /// Fails with `Engine(QueryReturnedNoRows)` when nothing matches.
    pub fn fetch_one<T, F>(&self, sql: &str, params: &[Value], map: F) -> DboResult<T>
    where
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        self.run(
            sql,
            |conn| conn.query_row(sql, params_from_iter(params.iter()), map),
            |_| 1,
        )
    }

    pub(crate) fn begin(&self) -> DboResult<()> {
        self.run("BEGIN DEFERRED;", |conn| conn.execute_batch("BEGIN DEFERRED;"), |_| 0)?;
        self.shared.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Commits and closes the session.
    pub(crate) fn commit(&self) -> DboResult<()> {
        let conn = self.lock_connection();
        self.shared.closed.store(true, Ordering::SeqCst);
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let result = self.run_locked(&conn, "COMMIT;", |conn| conn.execute_batch("COMMIT;"), |_| 0);
        if result.is_ok() {
            self.shared.in_transaction.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Closes the session, interrupts any running statement and rolls back.
    ///
    /// Never waits for the connection: when another handle is still inside a
    /// statement, returns `Ok(false)` and the rollback happens when the last
    /// handle drops.
    pub(crate) fn rollback(&self) -> DboResult<bool> {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.interrupt.interrupt();
        let conn = match self.shared.conn.try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(false),
        };
        if conn.is_autocommit() {
            self.shared.in_transaction.store(false, Ordering::SeqCst);
            return Ok(true);
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        self.run_locked(&conn, "ROLLBACK;", |conn| conn.execute_batch("ROLLBACK;"), |_| 0)?;
        self.shared.in_transaction.store(false, Ordering::SeqCst);
        Ok(true)
    }

    fn run<T, Op, Rows>(&self, sql: &str, op: Op, rows: Rows) -> DboResult<T>
    where
        Op: FnOnce(&Connection) -> rusqlite::Result<T>,
        Rows: FnOnce(&T) -> usize,
    {
        let conn = self.lock_connection();
        if self.is_closed() {
            return Err(DboError::Canceled);
        }
        self.ctx.check()?;
        conn.busy_timeout(self.busy_timeout())?;
        self.run_locked(&conn, sql, op, rows).map_err(|err| {
            // Lock waits and interrupts cut short by the deadline.
            if self.ctx.is_expired() {
                DboError::DeadlineExceeded
            } else {
                err
            }
        })
    }

    /// Lock-wait budget for the next statement: the default, capped by the
    /// time left before the deadline. Rounded up so the wait ends at or after
    /// the deadline rather than just before it.
    fn busy_timeout(&self) -> Duration {
        match self.ctx.remaining() {
            Some(remaining) => (remaining + Duration::from_millis(1)).min(BUSY_TIMEOUT),
            None => BUSY_TIMEOUT,
        }
    }

    fn run_locked<T, Op, Rows>(
        &self,
        conn: &Connection,
        sql: &str,
        op: Op,
        rows: Rows,
    ) -> DboResult<T>
    where
        Op: FnOnce(&Connection) -> rusqlite::Result<T>,
        Rows: FnOnce(&T) -> usize,
    {
        let started_at = Instant::now();
        let result = op(conn);
        let elapsed = started_at.elapsed();
        self.shared.statements.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(value) => {
                self.log_statement(sql, elapsed, Some(rows(&value)), None);
                Ok(value)
            }
            Err(err) => {
                self.log_statement(sql, elapsed, None, Some(&err));
                Err(err.into())
            }
        }
    }

    fn log_statement(
        &self,
        sql: &str,
        elapsed: Duration,
        rows: Option<usize>,
        err: Option<&rusqlite::Error>,
    ) {
        let log = self.shared.log;
        let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(err) = err {
            // QueryReturnedNoRows is an expected outcome of lookups.
            if log.level.logs_errors() && !matches!(err, rusqlite::Error::QueryReturnedNoRows) {
                warn!(
                    "event=sql module=session status=error session={} duration_ms={} sql=\"{}\" error={}",
                    self.shared.id,
                    elapsed.as_millis(),
                    sql,
                    err
                );
            }
            return;
        }

        let rows = rows.unwrap_or_default();
        if log.level.logs_slow() && !log.slow_threshold.is_zero() && elapsed >= log.slow_threshold {
            warn!(
                "event=sql module=session status=slow session={} duration_ms={} threshold_ms={} rows={} sql=\"{}\"",
                self.shared.id,
                elapsed.as_millis(),
                log.slow_threshold.as_millis(),
                rows,
                sql
            );
        } else if log.level.logs_all() {
            debug!(
                "event=sql module=session status=ok session={} duration_ms={} rows={} sql=\"{}\"",
                self.shared.id,
                elapsed.as_millis(),
                rows,
                sql
            );
        }
    }

    fn lock_connection(&self) -> MutexGuard<'_, PooledConnection> {
        self.shared
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        let conn = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        if conn.is_autocommit() {
            return;
        }
        match conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!(
                "event=tx_rollback module=session status=ok session={} deferred=true",
                self.id
            ),
            Err(err) => warn!(
                "event=tx_rollback module=session status=error session={} deferred=true error={}",
                self.id, err
            ),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("in_transaction", &self.in_transaction())
            .field("closed", &self.is_closed())
            .field("filter", &self.filter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, StatementLog};
    use crate::condition::QueryCondition;
    use crate::config::LogLevel;
    use crate::context::Context;
    use crate::db::{ConnectionPool, DbTarget, PoolLimits};
    use crate::error::DboError;
    use std::time::Duration;

    fn pooled_session() -> (ConnectionPool, Session) {
        let target = DbTarget::parse(":memory:").unwrap();
        let pool = ConnectionPool::new(target, PoolLimits::default()).unwrap();
        let conn = pool.get(&Context::background()).unwrap();
        let session = Session::new(
            conn,
            Context::background(),
            StatementLog {
                level: LogLevel::Info,
                slow_threshold: Duration::from_millis(200),
            },
        );
        (pool, session)
    }

    fn session() -> Session {
        pooled_session().1
    }

    #[test]
    fn shared_handle_keeps_its_own_filter() {
        let mut session = session();
        session.compose(&QueryCondition::new().and("id = ?", 1));
        let shared = session.share();
        assert_eq!(shared.id(), session.id());
        assert!(shared.filter().is_empty());
        assert!(!session.filter().is_empty());
    }

    #[test]
    fn rollback_closes_every_handle() {
        let session = session();
        session.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
        session.begin().unwrap();
        assert!(session.in_transaction());
        session.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();

        let shared = session.share();
        assert!(session.rollback().unwrap());
        assert!(!session.in_transaction());
        assert!(shared.is_closed());

        let err = shared.execute("INSERT INTO t (id) VALUES (2)", &[]).unwrap_err();
        assert!(matches!(err, DboError::Canceled));
    }

    #[test]
    fn rollback_does_not_wait_for_a_handle_inside_a_statement() {
        let (pool, session) = pooled_session();
        session.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
        session.begin().unwrap();
        session.execute("INSERT INTO t (id) VALUES (1)", &[]).unwrap();

        let worker = session.share();
        let busy = worker.shared.conn.lock().unwrap();
        assert!(!session.rollback().unwrap());
        assert!(worker.is_closed());
        drop(busy);
        drop(worker);
        drop(session);

        let conn = pool.get(&Context::background()).unwrap();
        assert!(conn.is_autocommit());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn expired_context_rejects_statements() {
        let mut session = session();
        session.ctx = Context::background().with_timeout(Duration::ZERO);
        let err = session.execute_batch("SELECT 1;").unwrap_err();
        assert!(matches!(err, DboError::DeadlineExceeded));
    }

    #[test]
    fn statements_are_counted_across_handles() {
        let session = session();
        let shared = session.share();
        session.execute_batch("SELECT 1;").unwrap();
        shared.execute_batch("SELECT 1;").unwrap();
        assert_eq!(session.statements_executed(), 2);
    }
}
