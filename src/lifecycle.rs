//! Host lifecycle: the application-state container plus the two named
//! extension points, "startup" and "shutdown".
//!
//! Hooks are registered up front and fired by whoever owns the process, in
//! practice [`crate::server::serve`]. Startup hooks finish before the first
//! request is accepted; shutdown hooks run after the listener has stopped.

use std::fmt;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::AppState;

/// Zero-argument async callback fired on a lifecycle event.
pub type Hook = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Startup,
    Shutdown,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Startup => f.write_str("startup"),
            LifecycleEvent::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// The hosted application
///
/// Owns the [`AppState`] every binder publishes into and the ordered hook
/// lists for each [`LifecycleEvent`].
#[derive(Default)]
pub struct App {
    state: AppState,
    startup: Vec<Hook>,
    shutdown: Vec<Hook>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an app around an existing state, e.g. one shared with a test.
    pub fn with_state(state: AppState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Register `hook` to run on `event`. Hooks run in registration order.
    pub fn on_event<F>(&mut self, event: LifecycleEvent, hook: F) -> &mut Self
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let hooks = match event {
            LifecycleEvent::Startup => &mut self.startup,
            LifecycleEvent::Shutdown => &mut self.shutdown,
        };
        hooks.push(Box::new(hook));
        self
    }

    /// Fire the startup hooks, stopping at the first failure.
    pub async fn startup(&self) -> Result<()> {
        self.fire(LifecycleEvent::Startup, &self.startup).await
    }

    /// Fire the shutdown hooks, stopping at the first failure.
    pub async fn shutdown(&self) -> Result<()> {
        self.fire(LifecycleEvent::Shutdown, &self.shutdown).await
    }

    async fn fire(&self, event: LifecycleEvent, hooks: &[Hook]) -> Result<()> {
        tracing::debug!(%event, hooks = hooks.len(), "firing lifecycle hooks");
        for (index, hook) in hooks.iter().enumerate() {
            if let Err(e) = hook().await {
                tracing::error!(%event, index, error = %e, "lifecycle hook failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("state", &self.state)
            .field("startup_hooks", &self.startup.len())
            .field("shutdown_hooks", &self.shutdown.len())
            .finish()
    }
}
