//! Deadline-bounded transaction executor.
//!
//! # Responsibility
//! - Run a unit of work inside one transaction on a dedicated worker thread.
//! - Race the worker against the transaction deadline and recover panics.
//! - Resolve every invocation with exactly one commit or rollback.
//!
//! # Invariants
//! - The caller blocks in exactly one `recv_timeout` per invocation.
//! - A rollback failure is logged and never replaces the original error.
//! - After a timeout the shared session is closed before rolling back, so an
//!   orphaned worker fails fast with `Canceled` on its next statement.
//! - Resolving never waits on the worker: if it is still inside a statement,
//!   the rollback runs when the worker drops its session.
//!
//! # See also
//! - `session` for the closed flag and interrupt handling.

use crate::context::Context;
use crate::dbo::{global, Dbo};
use crate::error::{DboError, DboResult};
use crate::logging::panic_message;
use crate::session::Session;
use log::{debug, error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

const WORKER_THREAD_PREFIX: &str = "dbo-tx";

impl Dbo {
    /// Runs `work` inside one transaction bounded by `ctx` and the configured
    /// transaction timeout.
    ///
    /// # Errors
    /// - Whatever `work` returns; the transaction is rolled back.
    /// - `PanicRecovered` when `work` panics.
    /// - `DeadlineExceeded` when the deadline passes before `work` finishes.
    /// - `Engine` when BEGIN or COMMIT fails.
    pub fn transaction<F>(&self, ctx: &Context, work: F) -> DboResult<()>
    where
        F: FnOnce(&mut Session) -> DboResult<()> + Send + 'static,
    {
        self.transaction_result(ctx, work)
    }

    /// Like [`Dbo::transaction`], but hands the value produced by `work`
    /// back to the caller once the commit succeeds.
    pub fn transaction_result<T, F>(&self, ctx: &Context, work: F) -> DboResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> DboResult<T> + Send + 'static,
    {
        let started_at = Instant::now();
        let ctx = ctx.with_timeout(self.config().transaction_timeout);
        let session = self.session_with(&ctx)?;
        session.begin()?;
        debug!(
            "event=tx_begin module=transaction status=ok session={} timeout_ms={}",
            session.id(),
            self.config().transaction_timeout.as_millis()
        );

        let (sender, receiver) = mpsc::sync_channel::<DboResult<T>>(1);
        let mut worker_session = session.share();
        let spawned = thread::Builder::new()
            .name(format!("{WORKER_THREAD_PREFIX}-{}", session.id().simple()))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&mut worker_session)));
                drop(worker_session);
                let result = outcome.unwrap_or_else(|payload| {
                    Err(DboError::PanicRecovered(panic_message(payload.as_ref())))
                });
                // The executor may already have given up on us.
                let _ = sender.send(result);
            });

        if let Err(err) = spawned {
            error!(
                "event=tx_dispatch module=transaction status=error session={} error={}",
                session.id(),
                err
            );
            rollback_logged(&session, started_at);
            return Err(DboError::Worker(err));
        }

        let received = match ctx.remaining() {
            Some(remaining) => receiver.recv_timeout(remaining),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let result = match received {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "event=tx_timeout module=transaction status=error session={} duration_ms={}",
                    session.id(),
                    started_at.elapsed().as_millis()
                );
                Err(DboError::DeadlineExceeded)
            }
            Err(RecvTimeoutError::Disconnected) => Err(DboError::PanicRecovered(
                "worker exited without reporting a result".to_string(),
            )),
        };

        match result {
            Ok(value) => match session.commit() {
                Ok(()) => {
                    debug!(
                        "event=tx_commit module=transaction status=ok session={} statements={} duration_ms={}",
                        session.id(),
                        session.statements_executed(),
                        started_at.elapsed().as_millis()
                    );
                    Ok(value)
                }
                Err(err) => {
                    error!(
                        "event=tx_commit module=transaction status=error session={} duration_ms={} error={}",
                        session.id(),
                        started_at.elapsed().as_millis(),
                        err
                    );
                    rollback_logged(&session, started_at);
                    Err(err)
                }
            },
            Err(err) => {
                match &err {
                    DboError::PanicRecovered(message) => error!(
                        "event=tx_panic module=transaction status=error session={} payload={}",
                        session.id(),
                        message
                    ),
                    DboError::DeadlineExceeded => {}
                    other => debug!(
                        "event=tx_work module=transaction status=error session={} error={}",
                        session.id(),
                        other
                    ),
                }
                rollback_logged(&session, started_at);
                Err(err)
            }
        }
    }
}

fn rollback_logged(session: &Session, started_at: Instant) {
    match session.rollback() {
        Ok(true) => debug!(
            "event=tx_rollback module=transaction status=ok session={} duration_ms={}",
            session.id(),
            started_at.elapsed().as_millis()
        ),
        Ok(false) => warn!(
            "event=tx_rollback module=transaction status=deferred session={} duration_ms={}",
            session.id(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=tx_rollback module=transaction status=error session={} duration_ms={} error={}",
            session.id(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
}

/// Runs `work` in a transaction on the global handle.
pub fn transaction<F>(ctx: &Context, work: F) -> DboResult<()>
where
    F: FnOnce(&mut Session) -> DboResult<()> + Send + 'static,
{
    global()?.transaction(ctx, work)
}

/// Runs `work` in a transaction on the global handle and returns its value.
pub fn transaction_result<T, F>(ctx: &Context, work: F) -> DboResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Session) -> DboResult<T> + Send + 'static,
{
    global()?.transaction_result(ctx, work)
}
