//! sqlx/Postgres implementation of the pool driver seam.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::Postgres;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::driver::{ConnectionPool, DbTransaction, Driver, PooledConnection};
use crate::error::{BoxError, Result};
use crate::options::DriverOptions;

/// Database connection pool type
pub type DbPool = sqlx::PgPool;

/// Database connection type - what both pooled connections and transactions
/// dereference to, usable as a sqlx executor
pub type DbConn = sqlx::PgConnection;

/// A connection borrowed from a [`DbPool`]
pub type PgPooledConnection = PoolConnection<Postgres>;

/// Options consumed by the pool itself; anything else becomes a Postgres
/// runtime parameter on every connection.
const POOL_OPTIONS: &[&str] = &[
    "max_connections",
    "min_connections",
    "acquire_timeout",
    "idle_timeout",
    "max_lifetime",
    "test_before_acquire",
];

/// Pool driver backed by `sqlx::PgPool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl PgDriver {
    /// Translate the recognised driver options into pool settings.
    pub fn pool_options(options: &DriverOptions) -> Result<PgPoolOptions> {
        let mut pool = PgPoolOptions::new();

        if let Some(max) = options.get::<u32>("max_connections")? {
            pool = pool.max_connections(max);
        }
        if let Some(min) = options.get::<u32>("min_connections")? {
            pool = pool.min_connections(min);
        }
        if let Some(timeout) = options.get_seconds("acquire_timeout")? {
            pool = pool.acquire_timeout(timeout);
        }
        if let Some(idle) = options.get_seconds("idle_timeout")? {
            pool = pool.idle_timeout(idle);
        }
        if let Some(lifetime) = options.get_seconds("max_lifetime")? {
            pool = pool.max_lifetime(lifetime);
        }
        if let Some(test) = options.get::<bool>("test_before_acquire")? {
            pool = pool.test_before_acquire(test);
        }

        Ok(pool)
    }

    /// Parse `target` and attach every non-pool option as a runtime parameter.
    pub fn connect_options(
        target: &str,
        options: &DriverOptions,
    ) -> std::result::Result<PgConnectOptions, sqlx::Error> {
        let connect = target.parse::<PgConnectOptions>()?;
        let runtime_params: Vec<(&str, &str)> = options
            .iter()
            .filter(|(name, _)| !POOL_OPTIONS.contains(name))
            .collect();

        if runtime_params.is_empty() {
            Ok(connect)
        } else {
            Ok(connect.options(runtime_params))
        }
    }
}

#[async_trait]
impl Driver for PgDriver {
    type Pool = DbPool;

    async fn create_pool(
        &self,
        target: &str,
        options: &DriverOptions,
    ) -> std::result::Result<DbPool, sqlx::Error> {
        let pool_options =
            Self::pool_options(options).map_err(|e| sqlx::Error::Configuration(e.into()))?;
        let connect_options = Self::connect_options(target, options)?;

        pool_options.connect_with(connect_options).await
    }

    fn validate_options(&self, options: &DriverOptions) -> Result<()> {
        Self::pool_options(options).map(|_| ())
    }
}

#[async_trait]
impl ConnectionPool for DbPool {
    type Connection = PgPooledConnection;

    async fn acquire(&self) -> std::result::Result<PgPooledConnection, sqlx::Error> {
        sqlx::Pool::acquire(self).await
    }

    async fn close(&self) {
        sqlx::Pool::close(self).await
    }
}

#[async_trait]
impl PooledConnection for PgPooledConnection {
    type Transaction<'c> = sqlx::Transaction<'c, Postgres>;

    async fn begin<'c>(
        &'c mut self,
    ) -> std::result::Result<sqlx::Transaction<'c, Postgres>, sqlx::Error> {
        sqlx::Connection::begin(&mut **self).await
    }

    async fn ping(&mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::Connection::ping(&mut **self).await
    }
}

#[async_trait]
impl<'c> DbTransaction for sqlx::Transaction<'c, Postgres> {
    async fn commit(self) -> std::result::Result<(), sqlx::Error> {
        sqlx::Transaction::commit(self).await
    }

    async fn rollback(self) -> std::result::Result<(), sqlx::Error> {
        sqlx::Transaction::rollback(self).await
    }
}

/// Run `sql` as a raw, possibly multi-statement script on `conn`.
///
/// Shaped to serve as a pool init routine:
/// `builder.init(move |conn| run_sql(Arc::clone(&sql), conn))`.
pub fn run_sql<'c>(
    sql: Arc<str>,
    conn: &'c mut PgPooledConnection,
) -> BoxFuture<'c, std::result::Result<(), BoxError>> {
    async move {
        let conn: &'c mut sqlx::PgConnection = &mut **conn;
        sqlx::Executor::execute(conn, sqlx::raw_sql(&sql)).await?;
        Ok(())
    }
    .boxed()
}
