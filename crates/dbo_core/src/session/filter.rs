//! Query composer: turns a [`Condition`] into a session's filter state.
//!
//! # Invariants
//! - Composition always starts from an empty state.
//! - Predicates are AND-joined in caller order; parameters follow the same
//!   order, then `LIMIT` and `OFFSET` when paging applies.

use crate::condition::Condition;
use rusqlite::types::Value;

const PREDICATE_SEPARATOR: &str = " AND ";

/// Transient WHERE / ORDER BY / LIMIT state of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    where_clause: Option<String>,
    params: Vec<Value>,
    order_by: Option<String>,
    window: Option<(u64, u64)>,
}

impl FilterState {
    /// Composes predicates, ordering and paging.
    pub fn compose<C: Condition + ?Sized>(condition: &C) -> Self {
        let mut state = Self::compose_predicates(condition);

        if let Some(order_by) = condition.order_by() {
            let order_by = order_by.trim();
            if !order_by.is_empty() {
                state.order_by = Some(order_by.to_string());
            }
        }

        if let Some(pager) = condition.pager() {
            if pager.is_enabled() {
                state.window = Some(pager.offset());
            }
        }

        state
    }

    /// Composes predicates only; ordering and paging are ignored.
    pub fn compose_predicates<C: Condition + ?Sized>(condition: &C) -> Self {
        let predicates = condition.predicates();
        if predicates.is_empty() {
            return Self::default();
        }

        let mut clauses = Vec::with_capacity(predicates.len());
        let mut params = Vec::new();
        for predicate in predicates {
            clauses.push(predicate.clause);
            params.extend(predicate.params);
        }

        Self {
            where_clause: Some(clauses.join(PREDICATE_SEPARATOR)),
            params,
            order_by: None,
            window: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn order_by(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    /// `(offset, limit)` when paging applies.
    pub fn window(&self) -> Option<(u64, u64)> {
        self.window
    }

    /// Renders `SELECT <columns> FROM <table> ...` with bound parameters.
    pub fn select_sql(&self, table: &str, columns: &[&str]) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));
        let mut params = self.params.clone();

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some((offset, limit)) = self.window {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Value::Integer(to_sql_integer(limit)));
            params.push(Value::Integer(to_sql_integer(offset)));
        }

        (sql, params)
    }

    /// Renders `SELECT COUNT(*) FROM <table> ...`; ordering and paging are
    /// never part of a count.
    pub fn count_sql(&self, table: &str) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        (sql, self.params.clone())
    }
}

fn to_sql_integer(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::FilterState;
    use crate::condition::{Condition, Predicate, QueryCondition};
    use crate::pager::Pager;
    use rusqlite::types::Value;

    #[test]
    fn empty_condition_is_unconstrained() {
        let state = FilterState::compose(&());
        assert!(state.is_empty());
        let (sql, params) = state.select_sql("users", &["id", "name"]);
        assert_eq!(sql, "SELECT id, name FROM users");
        assert!(params.is_empty());
    }

    #[test]
    fn full_condition_renders_in_order() {
        let cond = QueryCondition::new()
            .and("status = ?", "active".to_string())
            .and("age > ?", 18)
            .order_by("id ASC")
            .paged(Pager::new(3, 10));
        let (sql, params) = FilterState::compose(&cond).select_sql("users", &["id"]);
        assert_eq!(
            sql,
            "SELECT id FROM users WHERE status = ? AND age > ? ORDER BY id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            params,
            vec![
                Value::Text("active".into()),
                Value::Integer(18),
                Value::Integer(10),
                Value::Integer(20),
            ]
        );
    }

    #[test]
    fn disabled_pager_and_blank_order_are_ignored() {
        let cond = QueryCondition::new()
            .order_by("   ")
            .paged(Pager::NONE);
        let state = FilterState::compose(&cond);
        assert!(state.is_empty());
        assert_eq!(state.window(), None);
    }

    #[test]
    fn count_ignores_order_and_paging() {
        let cond = QueryCondition::new()
            .and("name = ?", "a".to_string())
            .order_by("id")
            .paged(Pager::new(1, 2));
        let (sql, params) = FilterState::compose(&cond).count_sql("users");
        assert_eq!(sql, "SELECT COUNT(*) FROM users WHERE name = ?");
        assert_eq!(params, vec![Value::Text("a".into())]);

        let predicates_only = FilterState::compose_predicates(&cond);
        assert_eq!(predicates_only.order_by(), None);
        assert_eq!(predicates_only.window(), None);
    }

    #[test]
    fn parameters_stay_positional_for_multi_value_clauses() {
        struct InFilter;
        impl Condition for InFilter {
            fn predicates(&self) -> Vec<Predicate> {
                vec![
                    Predicate::new("id IN (?,?,?)", vec![1.into(), 2.into(), 3.into()]),
                    Predicate::new("name <> ?", vec!["x'; DROP TABLE users; --".to_string().into()]),
                ]
            }
        }
        let state = FilterState::compose(&InFilter);
        assert_eq!(state.where_clause(), Some("id IN (?,?,?) AND name <> ?"));
        assert_eq!(state.params().len(), 4);
        assert!(!state.where_clause().unwrap().contains("DROP"));
    }
}
