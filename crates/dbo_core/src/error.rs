//! Error taxonomy shared by every data-access entry point.
//!
//! # Responsibility
//! - Name the few engine conditions callers are expected to branch on.
//! - Carry every other engine failure through unchanged.
//!
//! # Invariants
//! - Only unique-constraint violations and "no row" results are translated.
//! - A recovered panic is an ordinary error value, never a re-raised panic.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DboResult<T> = Result<T, DboError>;

/// Errors returned by sessions, CRUD operations and the transaction executor.
#[derive(Debug)]
pub enum DboError {
    /// A by-identity lookup matched no row.
    NotFound { table: String },
    /// An insert or update violated a uniqueness constraint.
    DuplicateRecord {
        table: String,
        source: rusqlite::Error,
    },
    /// The transaction timeout elapsed before the unit of work finished.
    DeadlineExceeded,
    /// A statement was issued on a session whose transaction is already closed.
    Canceled,
    /// The unit of work panicked; holds the panic payload description.
    PanicRecovered(String),
    /// Any other failure reported by SQLite.
    Engine(rusqlite::Error),
    /// No pooled connection could be checked out or the pool failed to start.
    Pool(r2d2::Error),
    /// Configuration rejected at construction time.
    Config(String),
    /// The unit-of-work thread could not be started.
    Worker(std::io::Error),
}

impl DboError {
    /// Returns whether this error is the "no matching row" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns whether this error is a uniqueness violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRecord { .. })
    }

    /// Returns whether the transaction was abandoned because of its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Canceled)
    }
}

impl Display for DboError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table } => write!(f, "record not found in `{table}`"),
            Self::DuplicateRecord { table, .. } => write!(f, "duplicate record in `{table}`"),
            Self::DeadlineExceeded => write!(f, "transaction deadline exceeded"),
            Self::Canceled => write!(f, "session canceled: transaction already closed"),
            Self::PanicRecovered(payload) => write!(f, "transaction panic: {payload}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::Config(message) => write!(f, "invalid configuration: {message}"),
            Self::Worker(err) => write!(f, "failed to start transaction worker: {err}"),
        }
    }
}

impl Error for DboError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DuplicateRecord { source, .. } => Some(source),
            Self::Engine(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::Worker(err) => Some(err),
            Self::NotFound { .. }
            | Self::DeadlineExceeded
            | Self::Canceled
            | Self::PanicRecovered(_)
            | Self::Config(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DboError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Engine(value)
    }
}

/// Returns whether the engine error is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

/// Maps a write-path engine error, turning uniqueness violations into
/// `DuplicateRecord`.
pub(crate) fn translate_write(table: &str, err: DboError) -> DboError {
    match err {
        DboError::Engine(source) if is_unique_violation(&source) => DboError::DuplicateRecord {
            table: table.to_string(),
            source,
        },
        other => other,
    }
}

/// Maps a read-by-identity engine error, turning "no rows" into `NotFound`.
pub(crate) fn translate_lookup(table: &str, err: DboError) -> DboError {
    match err {
        DboError::Engine(rusqlite::Error::QueryReturnedNoRows) => DboError::NotFound {
            table: table.to_string(),
        },
        other => other,
    }
}
