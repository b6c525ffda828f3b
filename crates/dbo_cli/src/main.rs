//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `dbo_core` end to end: open a database, write inside a
//!   transaction, then read a page back.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `dbo_cli [connection-string]` (defaults to `:memory:`).

use dbo_core::{Condition, Config, Context, Dbo, DboResult, Entity, Pager, QueryCondition, Value};
use log::info;
use rusqlite::Row;
use std::process::ExitCode;

#[derive(Debug)]
struct Class {
    id: i64,
    name: String,
}

impl Entity for Class {
    fn table_name() -> &'static str {
        "class"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Integer(self.id), Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

fn run(connection_string: &str) -> DboResult<()> {
    let dbo = Dbo::new(Config::new().with_connection_string(connection_string))?;
    dbo.session()?.execute_batch(
        "CREATE TABLE IF NOT EXISTS class (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    )?;

    let inserted = dbo.transaction_result(&Context::background(), |session| {
        let classes = (1..=5)
            .map(|id| Class {
                id,
                name: format!("class-{id}"),
            })
            .collect::<Vec<_>>();
        session.execute("DELETE FROM class", &[])?;
        session.insert_in_batches(&classes, 2)
    })?;
    info!("event=cli_seed module=cli status=ok rows={}", inserted);

    let cond = QueryCondition::new()
        .and("id > ?", 0)
        .order_by("id ASC")
        .paged(Pager::new(2, 2));
    let (total, page) = dbo.session()?.page::<Class, _>(&cond)?;

    println!("dbo_core version={}", dbo_core::core_version());
    println!(
        "total={} page={} pages={}",
        total,
        cond.pager().unwrap_or_default().page,
        cond.pager().unwrap_or_default().total_pages(total)
    );
    for class in page {
        println!("id={} name={}", class.id, class.name);
    }
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = dbo_core::init_logging(dbo_core::default_log_level(), None) {
        eprintln!("logging disabled: {err}");
    }

    let connection_string = std::env::args()
        .nth(1)
        .unwrap_or_else(|| ":memory:".to_string());

    match run(&connection_string) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dbo_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}
