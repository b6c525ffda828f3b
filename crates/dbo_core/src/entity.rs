//! Entity contract and the statement shapes derived from it.
//!
//! # Responsibility
//! - Describe how a caller record maps onto one table.
//! - Render INSERT and upsert statements from that description.
//!
//! # Invariants
//! - `values()` yields exactly one value per entry of `columns()`, in order.
//! - The identity column is one of `columns()`.

use rusqlite::types::Value;
use rusqlite::Row;

/// Caller record stored in one table.
///
/// # Example
///
/// ```ignore
/// impl Entity for Class {
///     fn table_name() -> &'static str { "class" }
///     fn columns() -> &'static [&'static str] { &["id", "name"] }
///     fn values(&self) -> Vec<Value> { vec![self.id.into(), self.name.clone().into()] }
///     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self { id: row.get("id")?, name: row.get("name")? })
///     }
/// }
/// ```
pub trait Entity: Sized {
    fn table_name() -> &'static str;

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str];

    /// Column values, ordered like [`Entity::columns`].
    fn values(&self) -> Vec<Value>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Bound-parameter ceiling of the bundled SQLite build
/// (`SQLITE_MAX_VARIABLE_NUMBER`).
pub(crate) const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Largest number of rows one INSERT can carry for `E`.
pub(crate) fn max_rows_per_statement<E: Entity>() -> usize {
    (MAX_BOUND_PARAMETERS / E::columns().len().max(1)).max(1)
}

/// Renders a multi-row INSERT for `rows` entities and collects the values.
pub(crate) fn insert_statement<E: Entity>(entities: &[E]) -> (String, Vec<Value>) {
    let columns = E::columns();
    let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
    let placeholders = vec![row_placeholder.as_str(); entities.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {placeholders}",
        E::table_name(),
        columns.join(", ")
    );
    let params = entities.iter().flat_map(E::values).collect();
    (sql, params)
}

/// Renders an insert-or-overwrite statement keyed on the identity column.
pub(crate) fn upsert_statement<E: Entity>(entity: &E) -> (String, Vec<Value>) {
    let (insert_sql, params) = insert_statement(std::slice::from_ref(entity));
    let id_column = E::id_column();
    let assignments = E::columns()
        .iter()
        .filter(|column| **column != id_column)
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>();

    let sql = if assignments.is_empty() {
        format!("{insert_sql} ON CONFLICT({id_column}) DO NOTHING")
    } else {
        format!(
            "{insert_sql} ON CONFLICT({id_column}) DO UPDATE SET {}",
            assignments.join(", ")
        )
    };
    (sql, params)
}

/// Renders `SELECT <columns> FROM <table> WHERE <id> = ?`.
pub(crate) fn get_statement<E: Entity>() -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = ? LIMIT 1",
        E::columns().join(", "),
        E::table_name(),
        E::id_column()
    )
}
