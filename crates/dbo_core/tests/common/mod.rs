#![allow(dead_code)]

use dbo_core::{Config, Dbo, Entity, Value};
use rusqlite::Row;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub id: i64,
    pub name: String,
    pub grade: i64,
}

impl Class {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            grade: 1,
        }
    }
}

impl Entity for Class {
    fn table_name() -> &'static str {
        "class"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name", "grade"]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.name.clone()),
            Value::Integer(self.grade),
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            grade: row.get("grade")?,
        })
    }
}

pub const SCHEMA: &str = "CREATE TABLE class (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    grade INTEGER NOT NULL DEFAULT 1
);";

pub fn memory_dbo() -> Dbo {
    dbo_with(Config::new())
}

pub fn dbo_with_timeout(timeout: Duration) -> Dbo {
    dbo_with(Config::new().with_transaction_timeout(timeout))
}

pub fn dbo_with(config: Config) -> Dbo {
    let dbo = Dbo::new(config).unwrap();
    dbo.session().unwrap().execute_batch(SCHEMA).unwrap();
    dbo
}

pub fn classes(ids: std::ops::RangeInclusive<i64>) -> Vec<Class> {
    ids.map(|id| Class::new(id, &format!("class-{id}"))).collect()
}
