//! Request-scoped access to the pool of a [`Database`].
//!
//! [`Database::connection`] lends one connection to a callback and gives it
//! back when the callback finishes. [`Database::transaction`] does the same
//! inside a transaction that is committed when the callback returns `Ok` and
//! rolled back when it returns `Err` or panics.
//!
//! Connections go back to the pool when they are dropped, so release happens
//! on every exit path, including cancellation of the calling task. The
//! connection outlives the transaction borrowed from it, so commit or
//! rollback always completes before it is dropped.

use std::ops::{Deref, DerefMut};
use std::panic::{AssertUnwindSafe, resume_unwind};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::binder::{Conn, Database};
use crate::database::{DbConn, PgPooledConnection};
use crate::driver::{ConnectionPool, DbTransaction, Driver, PooledConnection, TransactionState};
use crate::error::{Error, Result};

/// An active transaction lent to a [`Database::transaction`] callback.
///
/// Dereferences to the driver's transaction type. The scope owns the terminal
/// step, so the callback can run statements but cannot commit or roll back.
pub struct Tx<'t, C: PooledConnection + 't> {
    inner: C::Transaction<'t>,
}

impl<'t, C: PooledConnection + 't> Deref for Tx<'t, C> {
    type Target = C::Transaction<'t>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'t, C: PooledConnection + 't> DerefMut for Tx<'t, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Tx<'_, PgPooledConnection> {
    /// The Postgres connection the transaction runs on, usable as an executor.
    pub fn conn(&mut self) -> &mut DbConn {
        &mut self.inner
    }
}

impl<D: Driver> Database<D> {
    /// Borrow one connection from the pool.
    ///
    /// The connection returns to the pool when dropped. Prefer
    /// [`connection`](Self::connection) unless the connection must outlive a
    /// single callback.
    pub async fn acquire(&self) -> Result<Conn<D>> {
        let pool = self.pool().await?;
        let conn = pool.acquire().await.map_err(Error::Connection)?;
        tracing::trace!(slot = %self.slot(), "connection acquired");
        Ok(conn)
    }

    /// Run `f` with a connection borrowed from the pool.
    ///
    /// The connection is released once `f` finishes, whatever its outcome.
    /// Acquire failures are converted into the callback's error type.
    ///
    /// ```ignore
    /// let count: i64 = db
    ///     .connection(|conn| Box::pin(async move {
    ///         sqlx::query_scalar("SELECT count(*) FROM orders")
    ///             .fetch_one(&mut **conn)
    ///             .await
    ///             .map_err(AppError::from)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn connection<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut Conn<D>) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<Error>,
    {
        let mut conn = self.acquire().await?;
        let result = f(&mut conn).await;
        drop(conn);
        tracing::trace!(slot = %self.slot(), "connection released");
        result
    }

    /// Run `f` inside a transaction on a connection borrowed from the pool.
    ///
    /// - `f` returns `Ok`: the transaction is committed and the value returned.
    /// - `f` returns `Err`: the transaction is rolled back and the error is
    ///   returned unchanged.
    /// - `f` panics: the transaction is rolled back and the panic resumed.
    ///
    /// A failing commit or rollback is returned as [`Error::Transaction`]
    /// (converted into `E`); a rollback failure replaces the callback's
    /// error. The connection is released after commit or rollback in every
    /// case.
    pub async fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c, 't> FnOnce(&'c mut Tx<'t, Conn<D>>) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<Error>,
    {
        let slot = self.slot();
        let mut state = TransactionState::NotStarted;
        let mut conn = self.acquire().await?;

        let inner = conn.begin().await.map_err(|e| {
            tracing::debug!(%slot, ?state, error = %e, "begin failed");
            Error::Transaction(e)
        })?;
        let mut tx = Tx { inner };
        state = TransactionState::Active;
        tracing::debug!(%slot, ?state, "transaction started");

        let outcome = AssertUnwindSafe(f(&mut tx)).catch_unwind().await;
        let Tx { inner } = tx;

        let result = match outcome {
            Ok(Ok(value)) => {
                inner.commit().await.map_err(Error::Transaction)?;
                state = TransactionState::Committed;
                tracing::debug!(%slot, ?state, "transaction committed");
                Ok(value)
            }
            Ok(Err(e)) => {
                tracing::debug!(%slot, "callback failed, rolling back");
                if let Err(rollback) = inner.rollback().await {
                    tracing::error!(%slot, error = %rollback, "rollback failed, callback error discarded");
                    return Err(Error::Transaction(rollback).into());
                }
                state = TransactionState::RolledBack;
                tracing::debug!(%slot, ?state, "transaction rolled back");
                Err(e)
            }
            Err(panic) => {
                tracing::warn!(%slot, "callback panicked, rolling back");
                match inner.rollback().await {
                    Ok(()) => state = TransactionState::RolledBack,
                    Err(e) => tracing::error!(%slot, error = %e, "rollback after panic failed"),
                }
                tracing::debug!(%slot, ?state, "resuming panic");
                resume_unwind(panic);
            }
        };

        debug_assert!(state.is_terminal());
        tracing::trace!(%slot, ?state, "releasing connection");
        result
    }

    /// Alias of [`transaction`](Self::transaction).
    pub async fn atomic<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: for<'c, 't> FnOnce(&'c mut Tx<'t, Conn<D>>) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.transaction(f).await
    }
}
