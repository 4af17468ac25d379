//! Binds a database connection pool to the lifecycle of a server process.
//!
//! A [`Database`] registered on an [`App`] creates its pool when the app
//! starts (or adopts an externally supplied one), closes it when the app
//! stops, and lends connections and transactions to request handlers through
//! [`Database::connection`] and [`Database::transaction`].

pub mod binder;
pub mod config;
pub mod database;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod options;
pub mod scope;
pub mod server;
pub mod state;

pub use binder::{Conn, Database, DatabaseBuilder, InitRoutine};
pub use config::Config;
pub use database::{DbConn, DbPool, PgDriver, run_sql};
pub use driver::{ConnectionPool, DbTransaction, Driver, PooledConnection, TransactionState};
pub use error::{BoxError, Error, Result};
pub use lifecycle::{App, LifecycleEvent};
pub use options::DriverOptions;
pub use scope::Tx;
pub use state::{AppState, SlotId};

/// Load configuration from environment variables
pub fn load_config() -> Result<Config> {
    Config::load()
}
