//! Typed data access over SQLite with a deadline-bounded transaction
//! executor.
//!
//! Callers describe records with [`Entity`], filter them with a
//! [`Condition`], and run multi-statement work through
//! [`Dbo::transaction`]. Package-level functions operate on a replaceable
//! global [`Dbo`].

pub mod condition;
pub mod config;
pub mod context;
pub mod crud;
pub mod db;
pub mod dbo;
pub mod entity;
pub mod error;
pub mod logging;
pub mod pager;
pub mod session;
pub mod transaction;

pub use condition::{Condition, NullInts, NullStrings, Predicate, QueryCondition};
pub use config::{Config, DbType, LogLevel};
pub use context::Context;
pub use dbo::{get_session, global, must_get_session, replace_global, Dbo};
pub use entity::Entity;
pub use error::{DboError, DboResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use pager::Pager;
pub use rusqlite::types::Value;
pub use session::{FilterState, Session};
pub use transaction::{transaction, transaction_result};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
