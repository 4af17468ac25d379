use thiserror::Error;

use crate::state::SlotId;

// Import Axum types for HTTP response conversion
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Boxed error produced by user-supplied init routines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The custom error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool accessor was used before startup completed (or after shutdown).
    #[error("no pool is published for {slot}; has the startup hook run?")]
    NotConfigured { slot: SlotId },

    /// Owned-path startup ran while a pool is already live in the slot.
    #[error("a pool is already published for {slot}")]
    AlreadyStarted { slot: SlotId },

    /// A driver option carried a value that could not be interpreted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A configuration loading error.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Pool creation or connection acquisition failed in the driver.
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// The init routine failed; the pool was not published.
    #[error("Initialization error: {0}")]
    Initialization(#[source] BoxError),

    /// Begin, commit or rollback failed in the driver.
    #[error("Transaction error: {0}")]
    Transaction(#[source] sqlx::Error),

    /// Binding or serving the HTTP listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotConfigured { .. } => "NOT_CONFIGURED",
            Error::AlreadyStarted { .. } => "ALREADY_STARTED",
            Error::Configuration(_) | Error::Config(_) => "CONFIG_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::Initialization(_) => "INITIALIZATION_ERROR",
            Error::Transaction(_) => "TRANSACTION_ERROR",
            Error::Io(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::NotConfigured { .. } | Error::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert custom Error to HTTP response
///
/// Driver details are logged but never leak into the response body.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::error!(code = self.code(), error = %self, "request failed");

        let message = match &self {
            Error::NotConfigured { .. } | Error::Connection(_) => "Database unavailable",
            Error::Transaction(_) => "Database error",
            _ => "Internal error",
        };
        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (self.status(), Json(body)).into_response()
    }
}
