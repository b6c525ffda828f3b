//! SQLite connection bootstrap and pooling.
//!
//! # Responsibility
//! - Resolve connection strings into concrete SQLite targets.
//! - Open and configure connections, and recycle them through an `r2d2` pool.
//!
//! # Invariants
//! - `:memory:` maps to one private `memdb` database per pool, so every
//!   session of a handle sees the same data under ordinary file locking.
//! - Connections handed back to the pool are never inside a transaction.

mod open;
mod pool;

pub(crate) use open::{open_connection, open_flags, BUSY_TIMEOUT};
pub(crate) use pool::{ConnectionPool, PoolLimits, PooledConnection};

use crate::config::MEMORY_CONNECTION_STRING;
use crate::error::{DboError, DboResult};
use std::path::PathBuf;
use uuid::Uuid;

const SQLITE_URL_PREFIX: &str = "sqlite://";
const MEMDB_MARKER: &str = "vfs=memdb";

/// Concrete location of a SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    /// Database file on disk.
    File(PathBuf),
    /// `file:` URI, including private in-memory databases.
    Uri(String),
}

impl DbTarget {
    /// Parses `sqlite://<path>`, a bare path, a `file:` URI, or `:memory:`.
    pub fn parse(connection_string: &str) -> DboResult<Self> {
        let trimmed = connection_string.trim();
        let location = trimmed
            .strip_prefix(SQLITE_URL_PREFIX)
            .unwrap_or(trimmed);

        if location.is_empty() {
            return Err(DboError::Config(format!(
                "connection string `{connection_string}` has no database location"
            )));
        }

        if location == MEMORY_CONNECTION_STRING {
            // A leading slash makes the memdb database visible to every
            // connection of this process that names it.
            return Ok(Self::Uri(format!(
                "file:/dbo-{}?{MEMDB_MARKER}",
                Uuid::new_v4().simple()
            )));
        }

        if location.starts_with("file:") {
            return Ok(Self::Uri(location.to_string()));
        }

        Ok(Self::File(PathBuf::from(location)))
    }

    /// Returns whether the database disappears with its last connection.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Uri(uri) if uri.contains(MEMDB_MARKER) || uri.contains("mode=memory"))
    }

    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Uri(_) if self.is_memory() => "memory",
            Self::Uri(_) => "uri",
        }
    }
}
