//! Typed CRUD operations.
//!
//! # Responsibility
//! - Provide insert/update/save/get/query/count/page/raw-query on a
//!   [`Session`], plus package-level variants that use the global handle.
//! - Translate uniqueness violations and missing rows into the error taxonomy.
//!
//! # Invariants
//! - Every operation resets the session's filter state before running.
//! - `page` runs count and query as two separate statements; wrap it in a
//!   transaction to pin both reads to one snapshot.
//! - Success is logged at `debug`, failure at `warn`.

use crate::condition::Condition;
use crate::dbo::get_session;
use crate::entity::{
    get_statement, insert_statement, max_rows_per_statement, upsert_statement, Entity,
};
use crate::error::{translate_lookup, translate_write, DboResult};
use crate::session::Session;
use log::{debug, warn};
use rusqlite::types::Value;
use std::time::Instant;

impl Session {
    /// Inserts one entity and returns the affected-row count.
    pub fn insert<E: Entity>(&mut self, entity: &E) -> DboResult<usize> {
        self.insert_many(std::slice::from_ref(entity))
    }

    /// Inserts every entity with multi-row statements.
    ///
    /// Rows are split only as far as the engine's bound-parameter limit
    /// requires, so small slices go out as one statement.
    pub fn insert_many<E: Entity>(&mut self, entities: &[E]) -> DboResult<usize> {
        let started_at = Instant::now();
        self.reset_condition();
        if entities.is_empty() {
            return Ok(0);
        }

        let result = self.insert_chunks(entities, max_rows_per_statement::<E>());
        log_write("insert", E::table_name(), entities.len(), started_at, &result);
        result
    }

    /// Inserts `entities` in chunks of `batch_size` (zero means as few
    /// chunks as possible).
    ///
    /// A failing chunk stops the remaining ones and its error is returned;
    /// earlier chunks are not undone unless the caller runs inside a
    /// transaction.
    pub fn insert_in_batches<E: Entity>(
        &mut self,
        entities: &[E],
        batch_size: usize,
    ) -> DboResult<usize> {
        let started_at = Instant::now();
        self.reset_condition();
        let chunk_size = match batch_size {
            0 => entities.len().max(1),
            size => size,
        }
        .min(max_rows_per_statement::<E>());

        let result = self.insert_chunks(entities, chunk_size);
        match &result {
            Ok(affected) => debug!(
                "event=insert_batches module=crud status=ok table={} rows={} batch_size={} duration_ms={}",
                E::table_name(),
                affected,
                chunk_size,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=insert_batches module=crud status=error table={} batch_size={} duration_ms={} error={}",
                E::table_name(),
                chunk_size,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Runs one INSERT per chunk and stops at the first failure.
    fn insert_chunks<E: Entity>(&mut self, entities: &[E], chunk_size: usize) -> DboResult<usize> {
        let mut affected = 0;
        for (index, chunk) in entities.chunks(chunk_size.max(1)).enumerate() {
            let (sql, params) = insert_statement(chunk);
            match self.execute(&sql, &params) {
                Ok(rows) => affected += rows,
                Err(err) => {
                    debug!(
                        "event=insert_chunk module=crud status=error table={} chunk_index={} chunk_rows={} inserted={}",
                        E::table_name(),
                        index,
                        chunk.len(),
                        affected
                    );
                    return Err(translate_write(E::table_name(), err));
                }
            }
        }
        Ok(affected)
    }

    /// Inserts or overwrites `entity` by identity and returns the
    /// affected-row count.
    pub fn update<E: Entity>(&mut self, entity: &E) -> DboResult<usize> {
        let started_at = Instant::now();
        self.reset_condition();
        let (sql, params) = upsert_statement(entity);
        let result = self
            .execute(&sql, &params)
            .map_err(|err| translate_write(E::table_name(), err));
        log_write("update", E::table_name(), 1, started_at, &result);
        result
    }

    /// Inserts or overwrites `entity` by identity.
    ///
    /// Unlike [`Session::update`], engine errors are returned untranslated.
    pub fn save<E: Entity>(&mut self, entity: &E) -> DboResult<()> {
        let started_at = Instant::now();
        self.reset_condition();
        let (sql, params) = upsert_statement(entity);
        let result = self.execute(&sql, &params);
        log_write("save", E::table_name(), 1, started_at, &result);
        result.map(|_| ())
    }

    /// Loads one entity by identity.
    ///
    /// # Errors
    /// - `NotFound` when no row has that identity.
    pub fn get<E: Entity>(&mut self, id: impl Into<Value>) -> DboResult<E> {
        let started_at = Instant::now();
        self.reset_condition();
        let id = id.into();
        let result = self
            .fetch_one(&get_statement::<E>(), std::slice::from_ref(&id), E::from_row)
            .map_err(|err| translate_lookup(E::table_name(), err));

        match &result {
            Ok(_) => debug!(
                "event=get module=crud status=ok table={} id={:?} duration_ms={}",
                E::table_name(),
                id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=get module=crud status=error table={} id={:?} duration_ms={} error={}",
                E::table_name(),
                id,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Loads every entity matching `condition`, ordered and paged as it asks.
    pub fn query<E: Entity, C: Condition + ?Sized>(&mut self, condition: &C) -> DboResult<Vec<E>> {
        let started_at = Instant::now();
        self.compose(condition);
        let (sql, params) = self.filter().select_sql(E::table_name(), E::columns());
        let result = self.fetch_all::<E>(&sql, &params);
        log_read("query", E::table_name(), started_at, &result, |rows| rows.len());
        result
    }

    /// Counts entities matching the predicates of `condition`.
    pub fn count<E: Entity, C: Condition + ?Sized>(&mut self, condition: &C) -> DboResult<u64> {
        let started_at = Instant::now();
        self.compose_predicates(condition);
        let (sql, params) = self.filter().count_sql(E::table_name());
        let result = self
            .fetch_one(&sql, &params, |row| row.get::<_, i64>(0))
            .map(|total| u64::try_from(total).unwrap_or_default());
        log_read("count", E::table_name(), started_at, &result, |total| {
            usize::try_from(*total).unwrap_or(usize::MAX)
        });
        result
    }

    /// Returns the matching total and the requested page.
    ///
    /// The two reads are independent; concurrent writers may make them
    /// disagree unless the session belongs to a transaction.
    pub fn page<E: Entity, C: Condition + ?Sized>(
        &mut self,
        condition: &C,
    ) -> DboResult<(u64, Vec<E>)> {
        let total = self.count::<E, C>(condition)?;
        let values = self.query::<E, C>(condition)?;
        Ok((total, values))
    }

    /// Runs caller-written SQL, bypassing the query composer.
    pub fn query_raw<E: Entity>(&mut self, sql: &str, params: &[Value]) -> DboResult<Vec<E>> {
        let started_at = Instant::now();
        self.reset_condition();
        let result = self.fetch_all::<E>(sql, params);
        log_read("query_raw", E::table_name(), started_at, &result, |rows| rows.len());
        result
    }
}

fn log_write<T>(
    operation: &str,
    table: &str,
    entities: usize,
    started_at: Instant,
    result: &DboResult<T>,
) {
    match result {
        Ok(_) => debug!(
            "event={} module=crud status=ok table={} entities={} duration_ms={}",
            operation,
            table,
            entities,
            started_at.elapsed().as_millis()
        ),
        Err(err) if err.is_duplicate() => warn!(
            "event={} module=crud status=error error_code=duplicate_record table={} entities={} duration_ms={} error={}",
            operation,
            table,
            entities,
            started_at.elapsed().as_millis(),
            err
        ),
        Err(err) => warn!(
            "event={} module=crud status=error table={} entities={} duration_ms={} error={}",
            operation,
            table,
            entities,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

fn log_read<T>(
    operation: &str,
    table: &str,
    started_at: Instant,
    result: &DboResult<T>,
    rows: impl FnOnce(&T) -> usize,
) {
    match result {
        Ok(value) => debug!(
            "event={} module=crud status=ok table={} rows={} duration_ms={}",
            operation,
            table,
            rows(value),
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={} module=crud status=error table={} duration_ms={} error={}",
            operation,
            table,
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

/// Inserts one entity through the global handle.
pub fn insert<E: Entity>(entity: &E) -> DboResult<usize> {
    get_session()?.insert(entity)
}

/// Inserts every entity with one statement through the global handle.
pub fn insert_many<E: Entity>(entities: &[E]) -> DboResult<usize> {
    get_session()?.insert_many(entities)
}

/// Inserts in chunks through the global handle.
pub fn insert_in_batches<E: Entity>(entities: &[E], batch_size: usize) -> DboResult<usize> {
    get_session()?.insert_in_batches(entities, batch_size)
}

pub fn update<E: Entity>(entity: &E) -> DboResult<usize> {
    get_session()?.update(entity)
}

pub fn save<E: Entity>(entity: &E) -> DboResult<()> {
    get_session()?.save(entity)
}

pub fn get<E: Entity>(id: impl Into<Value>) -> DboResult<E> {
    get_session()?.get(id)
}

pub fn query<E: Entity, C: Condition + ?Sized>(condition: &C) -> DboResult<Vec<E>> {
    get_session()?.query(condition)
}

pub fn count<E: Entity, C: Condition + ?Sized>(condition: &C) -> DboResult<u64> {
    get_session()?.count::<E, C>(condition)
}

pub fn page<E: Entity, C: Condition + ?Sized>(condition: &C) -> DboResult<(u64, Vec<E>)> {
    get_session()?.page(condition)
}

pub fn query_raw<E: Entity>(sql: &str, params: &[Value]) -> DboResult<Vec<E>> {
    get_session()?.query_raw(sql, params)
}
