//! Pool driver seam
//!
//! The lifecycle and scope code never talks to a database directly. It needs
//! a driver that can build a pool, a pool that hands out connections, and a
//! connection that can run a transaction. The sqlx/Postgres implementation
//! lives in [`crate::database`]; tests plug in an instrumented driver.
//!
//! Connections give themselves back to their pool when dropped. That is the
//! only release path, so every exit from a scope releases exactly once.

use async_trait::async_trait;

use crate::options::DriverOptions;

/// Builds pools from a connection target.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Pool: ConnectionPool;

    /// Create a pool connected to `target`, suspending until the driver
    /// reports it ready.
    async fn create_pool(
        &self,
        target: &str,
        options: &DriverOptions,
    ) -> Result<Self::Pool, sqlx::Error>;

    /// Reject options this driver cannot interpret before any connection is
    /// attempted.
    fn validate_options(&self, _options: &DriverOptions) -> crate::Result<()> {
        Ok(())
    }
}

/// A handle to a set of reusable connections.
///
/// Clones refer to the same underlying pool. Must tolerate concurrent
/// `acquire` calls.
#[async_trait]
pub trait ConnectionPool: Clone + Send + Sync + 'static {
    type Connection: PooledConnection;

    /// Borrow a connection, waiting for one to become free.
    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;

    /// Drain and terminate every connection. Call at most once.
    async fn close(&self);
}

/// A borrowed connection; dropping it returns it to the pool.
#[async_trait]
pub trait PooledConnection: Send + 'static {
    type Transaction<'c>: DbTransaction
    where
        Self: 'c;

    /// Start a transaction on this connection.
    async fn begin<'c>(&'c mut self) -> Result<Self::Transaction<'c>, sqlx::Error>;

    /// Round-trip to the server to check the connection is alive.
    async fn ping(&mut self) -> Result<(), sqlx::Error>;
}

/// An active transaction. Both terminal operations consume it.
///
/// Dropping it without calling either must roll it back.
#[async_trait]
pub trait DbTransaction: Send {
    async fn commit(self) -> Result<(), sqlx::Error>;

    async fn rollback(self) -> Result<(), sqlx::Error>;
}

/// Where a transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}
