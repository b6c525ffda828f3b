//! Deadline propagation for sessions and transactions.
//!
//! # Invariants
//! - A derived context never outlives its parent's deadline.
//! - Contexts are cheap `Copy` values; there is no shared mutable state.

use crate::error::{DboError, DboResult};
use std::time::{Duration, Instant};

/// Deadline carrier bound to every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// Context with no deadline.
    pub fn background() -> Self {
        Self { deadline: None }
    }

    /// Derives a child whose deadline is the earlier of the parent's deadline
    /// and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (Some(parent), None) => Some(parent),
            (None, child) => child,
        };
        Self { deadline }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails with `DeadlineExceeded` once the deadline has passed.
    pub fn check(&self) -> DboResult<()> {
        if self.is_expired() {
            return Err(DboError::DeadlineExceeded);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use crate::error::DboError;
    use std::time::Duration;

    #[test]
    fn background_never_expires() {
        let ctx = Context::background();
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.remaining(), None);
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn child_deadline_is_capped_by_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());

        let tighter = parent.with_timeout(Duration::from_millis(1));
        assert!(tighter.deadline() < parent.deadline());
    }

    #[test]
    fn zero_timeout_is_immediately_expired() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        assert!(matches!(ctx.check(), Err(DboError::DeadlineExceeded)));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
