//! Connection pooling on top of `r2d2`.
//!
//! # Responsibility
//! - Map configured pool bounds onto an `r2d2::Pool` of SQLite connections.
//! - Bootstrap every new connection and bound checkout by the caller deadline.
//!
//! # Invariants
//! - A connection still inside a transaction when it comes back is treated as
//!   broken and dropped instead of being reused.
//! - Memory targets keep one anchor connection so the database outlives idle
//!   eviction; the anchor is not counted against `max_open`.

use super::open::bootstrap_connection;
use super::{open_connection, open_flags, DbTarget};
use crate::context::Context;
use crate::error::{DboError, DboResult};
use log::debug;
use r2d2::{CustomizeConnection, ManageConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Pool size used when `max_open` is zero.
const UNBOUNDED_POOL_SIZE: u32 = 64;

pub(crate) type PooledConnection = r2d2::PooledConnection<DboConnectionManager>;

/// Pool bounds. Zero disables the corresponding bound, except `max_idle`
/// where zero means no connection is kept warm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PoolLimits {
    pub max_open: usize,
    pub max_idle: usize,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl PoolLimits {
    fn max_size(&self) -> u32 {
        match self.max_open {
            0 => UNBOUNDED_POOL_SIZE,
            open => u32::try_from(open).unwrap_or(u32::MAX),
        }
    }

    fn min_idle(&self) -> u32 {
        u32::try_from(self.max_idle)
            .unwrap_or(u32::MAX)
            .min(self.max_size())
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

/// `r2d2_sqlite` manager that also refuses connections left mid-transaction.
pub(crate) struct DboConnectionManager {
    inner: SqliteConnectionManager,
}

impl ManageConnection for DboConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        self.inner.connect()
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        self.inner.is_valid(conn)
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        !conn.is_autocommit()
    }
}

#[derive(Debug)]
struct ConnectionBootstrap {
    mode: &'static str,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionBootstrap {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        bootstrap_connection(conn)?;
        debug!("event=pool_connect module=db status=ok mode={}", self.mode);
        Ok(())
    }
}

pub(crate) struct ConnectionPool {
    target: DbTarget,
    pool: r2d2::Pool<DboConnectionManager>,
    _anchor: Option<Mutex<Connection>>,
}

impl ConnectionPool {
    pub(crate) fn new(target: DbTarget, limits: PoolLimits) -> DboResult<Self> {
        let started_at = Instant::now();
        let anchor = if target.is_memory() {
            Some(Mutex::new(open_connection(&target)?))
        } else {
            None
        };

        let inner = match &target {
            DbTarget::File(path) => SqliteConnectionManager::file(path),
            DbTarget::Uri(uri) => SqliteConnectionManager::file(uri),
        }
        .with_flags(open_flags());

        let pool = r2d2::Pool::builder()
            .max_size(limits.max_size())
            .min_idle(Some(limits.min_idle()))
            .max_lifetime(non_zero(limits.max_lifetime))
            .idle_timeout(non_zero(limits.max_idle_time))
            .connection_customizer(Box::new(ConnectionBootstrap { mode: target.mode() }))
            .build(DboConnectionManager { inner })
            .map_err(DboError::Pool)?;

        debug!(
            "event=pool_init module=db status=ok mode={} max_size={} min_idle={} duration_ms={}",
            target.mode(),
            limits.max_size(),
            limits.min_idle(),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            target,
            pool,
            _anchor: anchor,
        })
    }

    pub(crate) fn target(&self) -> &DbTarget {
        &self.target
    }

    /// Checks out a connection, waiting for a free slot until the context
    /// deadline (or the pool's own connection timeout without one).
    pub(crate) fn get(&self, ctx: &Context) -> DboResult<PooledConnection> {
        ctx.check()?;
        let checked_out = match ctx.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        checked_out.map_err(|err| {
            if ctx.is_expired() {
                DboError::DeadlineExceeded
            } else {
                DboError::Pool(err)
            }
        })
    }

    /// Returns `(open, idle)` connection counts.
    pub(crate) fn stats(&self) -> (usize, usize) {
        let state = self.pool.state();
        (state.connections as usize, state.idle_connections as usize)
    }
}
