//! Construction-time configuration for a [`Dbo`](crate::Dbo) handle.
//!
//! # Invariants
//! - Configuration is applied once, when the handle is built.
//! - Durations are expressed in milliseconds when deserialized.

use crate::error::{DboError, DboResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(200);
pub const MEMORY_CONNECTION_STRING: &str = ":memory:";

/// Relational engine selector.
///
/// Deserializes through [`DbType::parse`], so engine names are accepted
/// case-insensitively and `sqlite3` is an alias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum DbType {
    #[default]
    Sqlite,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses an engine name, case-insensitively.
    pub fn parse(value: &str) -> DboResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(DboError::Config(format!(
                "unsupported database type `{other}`; expected sqlite"
            ))),
        }
    }
}

impl TryFrom<String> for DbType {
    type Error = DboError;

    fn try_from(value: String) -> DboResult<Self> {
        Self::parse(&value)
    }
}

impl Display for DbType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement log verbosity.
///
/// Each level includes the ones above it: `Info` logs every statement,
/// `Warn` slow and failing statements, `Error` failing statements only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silent => "Silent",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
        }
    }

    pub fn logs_errors(&self) -> bool {
        *self >= Self::Error
    }

    pub fn logs_slow(&self) -> bool {
        *self >= Self::Warn
    }

    pub fn logs_all(&self) -> bool {
        *self >= Self::Info
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-access configuration.
///
/// Zero pool bounds mean "unbounded" for open connections and "no idle
/// connections kept" for idle ones; zero durations disable the bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `sqlite://<path>`, a plain path, or `:memory:`.
    pub connection_string: String,
    pub db_type: DbType,
    pub max_open_conns: usize,
    pub max_idle_conns: usize,
    #[serde(rename = "conn_max_lifetime_ms", with = "millis")]
    pub conn_max_lifetime: Duration,
    #[serde(rename = "conn_max_idle_time_ms", with = "millis")]
    pub conn_max_idle_time: Duration,
    #[serde(rename = "transaction_timeout_ms", with = "millis")]
    pub transaction_timeout: Duration,
    pub log_level: LogLevel,
    #[serde(rename = "slow_threshold_ms", with = "millis")]
    pub slow_threshold: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_string: MEMORY_CONNECTION_STRING.to_string(),
            db_type: DbType::Sqlite,
            max_open_conns: 0,
            max_idle_conns: 2,
            conn_max_lifetime: Duration::ZERO,
            conn_max_idle_time: Duration::ZERO,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            log_level: LogLevel::Info,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_max_open_conns(mut self, max_open_conns: usize) -> Self {
        self.max_open_conns = max_open_conns;
        self
    }

    pub fn with_max_idle_conns(mut self, max_idle_conns: usize) -> Self {
        self.max_idle_conns = max_idle_conns;
        self
    }

    pub fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    pub fn with_conn_max_idle_time(mut self, idle_time: Duration) -> Self {
        self.conn_max_idle_time = idle_time;
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Rejects settings no handle could honour.
    pub fn validate(&self) -> DboResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(DboError::Config("connection string cannot be empty".to_string()));
        }
        if self.transaction_timeout.is_zero() {
            return Err(DboError::Config(
                "transaction timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_open_conns > 0 && self.max_idle_conns > self.max_open_conns {
            return Err(DboError::Config(format!(
                "max idle connections ({}) exceed max open connections ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, DbType, LogLevel};
    use crate::error::DboError;
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.transaction_timeout, Duration::from_secs(3));
        assert_eq!(config.slow_threshold, Duration::from_millis(200));
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.db_type, DbType::Sqlite);
        assert_eq!(config.connection_string, ":memory:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides_fields() {
        let config = Config::new()
            .with_connection_string("sqlite:///tmp/app.db")
            .with_max_open_conns(8)
            .with_max_idle_conns(2)
            .with_transaction_timeout(Duration::from_millis(50))
            .with_log_level(LogLevel::Warn);
        assert_eq!(config.connection_string, "sqlite:///tmp/app.db");
        assert_eq!(config.max_open_conns, 8);
        assert_eq!(config.transaction_timeout, Duration::from_millis(50));
        assert_eq!(config.log_level, LogLevel::Warn);
    }

    #[test]
    fn validate_rejects_inconsistent_bounds() {
        let err = Config::new()
            .with_max_open_conns(1)
            .with_max_idle_conns(4)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DboError::Config(_)));

        let err = Config::new()
            .with_transaction_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn log_levels_are_ordered() {
        assert!(LogLevel::Info.logs_all());
        assert!(!LogLevel::Warn.logs_all());
        assert!(LogLevel::Warn.logs_slow());
        assert!(LogLevel::Error.logs_errors());
        assert!(!LogLevel::Silent.logs_errors());
    }

    #[test]
    fn db_type_parses_known_names() {
        assert_eq!(DbType::parse(" SQLite ").unwrap(), DbType::Sqlite);
        assert!(DbType::parse("mysql").is_err());
    }
}
