//! Shared test helper functions
//!
//! This module provides common utility functions used across multiple test files,
//! reducing code duplication and ensuring consistent test patterns.

use pool_lifespan::{App, Database, DatabaseBuilder};

use crate::common::driver::{MOCK_TARGET, MockDriver};

/// Error type of the code running inside a scope.
#[derive(Debug, thiserror::Error)]
pub enum CallerError {
    #[error("caller failed: {0}")]
    Failed(&'static str),

    #[error(transparent)]
    Database(#[from] pool_lifespan::Error),
}

/// Builder for a binder over a fresh [`MockDriver`] with `capacity` connections
///
/// # Returns
/// The builder plus a handle to the driver for inspecting its recorder.
///
/// # Example
/// ```no_run
/// let (builder, driver) = mock_builder(2);
/// let mut app = App::new();
/// let db = builder.register(&mut app);
/// ```
pub fn mock_builder(capacity: usize) -> (DatabaseBuilder<MockDriver>, MockDriver) {
    let driver = MockDriver::new(capacity);
    (DatabaseBuilder::new(driver.clone(), MOCK_TARGET), driver)
}

/// Registers an owned mock binder and fires the app's startup hooks
///
/// # Returns
/// The started app, its binder and the driver
pub async fn started_mock(capacity: usize) -> (App, Database<MockDriver>, MockDriver) {
    let (builder, driver) = mock_builder(capacity);
    let mut app = App::new();
    let db = builder.register(&mut app);
    app.startup().await.expect("startup should succeed");
    (app, db, driver)
}
