//! Data-access handle and the process-wide default instance.
//!
//! # Responsibility
//! - Build a connection pool from [`Config`] and hand out sessions.
//! - Hold the replaceable global handle used by package-level entry points.
//!
//! # Invariants
//! - The global handle is only ever set by `global()` (lazy default) or
//!   `replace_global()`; normal operations never mutate it.
//! - Operations keep their own `Arc` to the handle they started with, so a
//!   swap never affects in-flight work.

use crate::config::{Config, DbType};
use crate::context::Context;
use crate::db::{ConnectionPool, DbTarget, PoolLimits};
use crate::error::DboResult;
use crate::session::{Session, StatementLog};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

static GLOBAL_DBO: Lazy<Mutex<Option<Arc<Dbo>>>> = Lazy::new(|| Mutex::new(None));

/// Database operator: configuration plus a bounded connection pool.
pub struct Dbo {
    config: Config,
    pool: ConnectionPool,
}

impl Dbo {
    /// Builds a handle and verifies the database is reachable.
    ///
    /// # Errors
    /// - `Config` when the configuration is inconsistent.
    /// - `Engine` when the first connection cannot be opened or pinged.
    pub fn new(config: Config) -> DboResult<Self> {
        let started_at = Instant::now();
        config.validate()?;

        let target = match config.db_type {
            DbType::Sqlite => DbTarget::parse(&config.connection_string)?,
        };

        let limits = PoolLimits {
            max_open: config.max_open_conns,
            max_idle: config.max_idle_conns,
            max_lifetime: config.conn_max_lifetime,
            max_idle_time: config.conn_max_idle_time,
        };

        let pool = ConnectionPool::new(target, limits).map_err(|err| {
            warn!(
                "event=dbo_init module=dbo status=error db_type={} duration_ms={} error_code=pool_init_failed error={}",
                config.db_type,
                started_at.elapsed().as_millis(),
                err
            );
            err
        })?;

        let dbo = Self { config, pool };
        if let Err(err) = dbo.ping() {
            warn!(
                "event=dbo_init module=dbo status=error db_type={} duration_ms={} error_code=ping_failed error={}",
                dbo.config.db_type,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=dbo_init module=dbo status=ok db_type={} mode={} max_open={} max_idle={} tx_timeout_ms={} duration_ms={}",
            dbo.config.db_type,
            dbo.pool.target().mode(),
            dbo.config.max_open_conns,
            dbo.config.max_idle_conns,
            dbo.config.transaction_timeout.as_millis(),
            started_at.elapsed().as_millis()
        );
        Ok(dbo)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `(open, idle)` pool connection counts.
    pub fn pool_stats(&self) -> (usize, usize) {
        self.pool.stats()
    }

    /// Checks out a session with no deadline.
    pub fn session(&self) -> DboResult<Session> {
        self.session_with(&Context::background())
    }

    /// Checks out a session bound to `ctx`.
    pub fn session_with(&self, ctx: &Context) -> DboResult<Session> {
        let conn = self.pool.get(ctx)?;
        Ok(Session::new(conn, *ctx, self.statement_log()))
    }

    /// Round-trips a trivial statement through a pooled connection.
    pub fn ping(&self) -> DboResult<()> {
        let session = self.session()?;
        session.fetch_one("SELECT 1", &[], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn statement_log(&self) -> StatementLog {
        StatementLog {
            level: self.config.log_level,
            slow_threshold: self.config.slow_threshold,
        }
    }
}

impl std::fmt::Debug for Dbo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dbo")
            .field("config", &self.config)
            .field("pool", &self.pool.stats())
            .finish()
    }
}

/// Returns the global handle, creating one from `Config::default()` on
/// first use.
pub fn global() -> DboResult<Arc<Dbo>> {
    let mut slot = GLOBAL_DBO.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(dbo) = slot.as_ref() {
        return Ok(Arc::clone(dbo));
    }

    let dbo = Arc::new(Dbo::new(Config::default())?);
    *slot = Some(Arc::clone(&dbo));
    Ok(dbo)
}

/// Swaps the global handle wholesale and returns the previous one.
pub fn replace_global(dbo: Dbo) -> Option<Arc<Dbo>> {
    let mut slot = GLOBAL_DBO.lock().unwrap_or_else(PoisonError::into_inner);
    info!("event=dbo_replace_global module=dbo status=ok");
    slot.replace(Arc::new(dbo))
}

/// Checks out a session from the global handle.
pub fn get_session() -> DboResult<Session> {
    global()?.session()
}

/// Checks out a session from the global handle, panicking on failure.
///
/// # Panics
/// - When the global handle cannot be created or no connection is available.
pub fn must_get_session() -> Session {
    match get_session() {
        Ok(session) => session,
        Err(err) => {
            error!(
                "event=get_session module=dbo status=error error_code=session_unavailable error={}",
                err
            );
            panic!("get db session failed: {err}");
        }
    }
}
