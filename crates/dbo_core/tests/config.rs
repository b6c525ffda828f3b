use dbo_core::{Config, Dbo, DbType, DboError, LogLevel};
use std::time::Duration;

#[test]
fn config_deserializes_with_millisecond_durations() {
    let config: Config = serde_json::from_str(
        r#"{
            "connection_string": "sqlite:///var/lib/app/data.db",
            "db_type": "sqlite",
            "max_open_conns": 10,
            "max_idle_conns": 4,
            "conn_max_lifetime_ms": 60000,
            "transaction_timeout_ms": 1500,
            "log_level": "Warn",
            "slow_threshold_ms": 50
        }"#,
    )
    .unwrap();

    assert_eq!(config.connection_string, "sqlite:///var/lib/app/data.db");
    assert_eq!(config.db_type, DbType::Sqlite);
    assert_eq!(config.max_open_conns, 10);
    assert_eq!(config.max_idle_conns, 4);
    assert_eq!(config.conn_max_lifetime, Duration::from_secs(60));
    assert_eq!(config.conn_max_idle_time, Duration::ZERO);
    assert_eq!(config.transaction_timeout, Duration::from_millis(1500));
    assert_eq!(config.log_level, LogLevel::Warn);
    assert_eq!(config.slow_threshold, Duration::from_millis(50));
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn unknown_engine_is_rejected_at_parse_time() {
    let result = serde_json::from_str::<Config>(r#"{ "db_type": "oracle" }"#);
    assert!(result.is_err());
}

#[test]
fn engine_names_are_case_insensitive() {
    for name in ["SQLite", " sqlite3 "] {
        let json = format!(r#"{{ "db_type": "{name}" }}"#);
        let config: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.db_type, DbType::Sqlite);
    }

    let err = serde_json::from_str::<Config>(r#"{ "db_type": "oracle" }"#).unwrap_err();
    assert!(err.to_string().contains("unsupported database type"), "{err}");
}

#[test]
fn invalid_config_is_rejected_by_constructor() {
    let err = Dbo::new(Config::new().with_connection_string("  ")).unwrap_err();
    assert!(matches!(err, DboError::Config(_)), "unexpected error: {err:?}");

    let err = Dbo::new(Config::new().with_transaction_timeout(Duration::ZERO)).unwrap_err();
    assert!(matches!(err, DboError::Config(_)));
}

#[test]
fn serialized_config_round_trips_through_json() {
    let config = Config::new()
        .with_max_open_conns(3)
        .with_slow_threshold(Duration::from_millis(75));
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["slow_threshold_ms"], 75);
    assert_eq!(json["max_open_conns"], 3);
}
