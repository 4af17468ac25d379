//! Binds a connection pool to the lifecycle of an [`App`].
//!
//! A [`Database`] is configured once, before the app starts. Registering it
//! hooks `on_startup`/`on_shutdown` into the app; from then on the pool it
//! publishes is reachable through [`Database::pool`] and the request scopes
//! in [`crate::scope`].
//!
//! Two ownership modes:
//! - **owned**: the binder creates the pool on startup (running the optional
//!   init routine first) and closes it on shutdown;
//! - **external**: a pool handed in with [`DatabaseBuilder::pool`] is
//!   published as-is. The binder never creates, initializes or closes it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};

use crate::database::PgDriver;
use crate::driver::{ConnectionPool, Driver};
use crate::error::{BoxError, Error, Result};
use crate::lifecycle::{App, LifecycleEvent};
use crate::options::DriverOptions;
use crate::state::{AppState, SlotId};

/// Connection type handed out by the pool of driver `D`.
pub type Conn<D> = <<D as Driver>::Pool as ConnectionPool>::Connection;

/// One-time setup run against a dedicated connection of a freshly created pool.
pub type InitRoutine<D> =
    dyn for<'c> Fn(&'c mut Conn<D>) -> BoxFuture<'c, std::result::Result<(), BoxError>>
        + Send
        + Sync;

/// Configures a [`Database`] before it is registered on an [`App`].
pub struct DatabaseBuilder<D: Driver = PgDriver> {
    driver: D,
    target: SecretString,
    options: DriverOptions,
    external: Option<D::Pool>,
    init: Option<Arc<InitRoutine<D>>>,
}

impl<D: Driver> DatabaseBuilder<D> {
    /// Start configuring a binder that creates its pool with `driver`.
    pub fn new(driver: D, target: impl Into<SecretString>) -> Self {
        Self {
            driver,
            target: target.into(),
            options: DriverOptions::default(),
            external: None,
            init: None,
        }
    }

    /// Replace all driver options.
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Set one driver option.
    pub fn option(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.options.set(name, value);
        self
    }

    /// Use an externally owned pool instead of creating one.
    ///
    /// The init routine is never run against it and it is never closed.
    pub fn pool(mut self, pool: D::Pool) -> Self {
        self.external = Some(pool);
        self
    }

    /// Run `routine` once against one connection of the new pool, before the
    /// pool is published.
    pub fn init<F>(mut self, routine: F) -> Self
    where
        F: for<'c> Fn(&'c mut Conn<D>) -> BoxFuture<'c, std::result::Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.init = Some(Arc::new(routine));
        self
    }

    /// Finish configuration and hook the binder into `app`'s lifecycle.
    ///
    /// Nothing is connected yet; the pool appears when the app fires its
    /// startup hooks.
    pub fn register(self, app: &mut App) -> Database<D> {
        let db = Database {
            inner: Arc::new(Inner {
                slot: SlotId::new(),
                state: app.state().clone(),
                driver: self.driver,
                target: self.target,
                options: self.options,
                external: self.external,
                init: RwLock::new(self.init),
            }),
        };

        let startup = db.clone();
        app.on_event(LifecycleEvent::Startup, move || {
            let db = startup.clone();
            async move { db.on_startup().await }.boxed()
        });

        let shutdown = db.clone();
        app.on_event(LifecycleEvent::Shutdown, move || {
            let db = shutdown.clone();
            async move { db.on_shutdown().await }.boxed()
        });

        tracing::debug!(slot = %db.slot(), external = db.is_external(), "database registered");
        db
    }
}

struct Inner<D: Driver> {
    slot: SlotId,
    state: AppState,
    driver: D,
    target: SecretString,
    options: DriverOptions,
    external: Option<D::Pool>,
    init: RwLock<Option<Arc<InitRoutine<D>>>>,
}

/// A pool bound to an application's lifecycle
///
/// Cheap to clone; every clone refers to the same binding and slot, so it can
/// be handed to axum as router state.
pub struct Database<D: Driver = PgDriver> {
    inner: Arc<Inner<D>>,
}

impl Database<PgDriver> {
    /// Start configuring a Postgres binder for `target`.
    pub fn builder(target: impl Into<SecretString>) -> DatabaseBuilder<PgDriver> {
        DatabaseBuilder::new(PgDriver, target)
    }

    /// Register a Postgres binder for `target` with default options.
    pub fn new(app: &mut App, target: impl Into<SecretString>) -> Self {
        Self::builder(target).register(app)
    }
}

impl<D: Driver> Database<D> {
    /// The slot this binder publishes its pool under.
    pub fn slot(&self) -> SlotId {
        self.inner.slot
    }

    /// Whether the pool was supplied from outside.
    pub fn is_external(&self) -> bool {
        self.inner.external.is_some()
    }

    pub fn options(&self) -> &DriverOptions {
        &self.inner.options
    }

    /// Register or replace the init routine after construction.
    ///
    /// Only affects a startup that has not run yet.
    pub fn on_init<F>(&self, routine: F) -> &Self
    where
        F: for<'c> Fn(&'c mut Conn<D>) -> BoxFuture<'c, std::result::Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        let mut init = self
            .inner
            .init
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *init = Some(Arc::new(routine));
        self
    }

    fn init_routine(&self) -> Option<Arc<InitRoutine<D>>> {
        self.inner
            .init
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The live pool published for this binder.
    ///
    /// Fails with [`Error::NotConfigured`] until startup has completed.
    pub async fn pool(&self) -> Result<D::Pool> {
        self.inner
            .state
            .get::<D::Pool>(self.inner.slot)
            .await
            .ok_or(Error::NotConfigured {
                slot: self.inner.slot,
            })
    }

    /// Startup hook: publish a live pool in this binder's slot.
    pub async fn on_startup(&self) -> Result<()> {
        let inner = &self.inner;
        let slot = inner.slot;

        if let Some(pool) = &inner.external {
            inner.state.insert(slot, pool.clone()).await;
            tracing::info!(%slot, "using externally supplied pool");
            return Ok(());
        }

        if inner.state.contains(slot).await {
            return Err(Error::AlreadyStarted { slot });
        }

        inner.driver.validate_options(&inner.options)?;
        let pool = inner
            .driver
            .create_pool(inner.target.expose_secret(), &inner.options)
            .await
            .map_err(Error::Connection)?;
        tracing::info!(%slot, options = inner.options.len(), "pool created");

        if let Some(init) = self.init_routine() {
            let mut conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    pool.close().await;
                    return Err(Error::Connection(e));
                }
            };
            let outcome = init(&mut conn).await;
            drop(conn);

            if let Err(e) = outcome {
                tracing::error!(%slot, error = %e, "init routine failed, pool not published");
                pool.close().await;
                return Err(Error::Initialization(e));
            }
            tracing::debug!(%slot, "init routine completed");
        }

        if !inner.state.insert(slot, pool.clone()).await {
            tracing::warn!(%slot, "lost startup race, closing duplicate pool");
            pool.close().await;
            return Err(Error::AlreadyStarted { slot });
        }
        tracing::info!(%slot, "pool published");
        Ok(())
    }

    /// Shutdown hook: close the pool this binder created.
    pub async fn on_shutdown(&self) -> Result<()> {
        let slot = self.inner.slot;

        if self.is_external() {
            tracing::debug!(%slot, "leaving externally supplied pool open");
            return Ok(());
        }

        let pool = self
            .inner
            .state
            .remove::<D::Pool>(slot)
            .await
            .ok_or(Error::NotConfigured { slot })?;
        pool.close().await;
        tracing::info!(%slot, "pool closed");
        Ok(())
    }
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("slot", &self.inner.slot)
            .field("target", &self.inner.target)
            .field("options", &self.inner.options)
            .field("external", &self.is_external())
            .finish()
    }
}
