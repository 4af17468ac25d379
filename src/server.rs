//! Runs an axum router inside an [`App`]'s lifecycle.
//!
//! Startup hooks complete before the listener accepts anything; shutdown
//! hooks run once axum has drained in-flight requests.

use std::future::Future;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::binder::Database;
use crate::driver::Driver;
use crate::error::Result;
use crate::handlers::health::health_check;
use crate::lifecycle::App;

/// Build the HTTP routes served on top of `db`.
pub fn router<D: Driver>(db: Database<D>) -> Router {
    let api_routes = Router::new().route("/health", get(health_check::<D>));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

/// Fire startup hooks, serve `router` until `shutdown` resolves, then fire
/// shutdown hooks.
///
/// A failing startup hook aborts before anything is served. Shutdown hooks
/// run even if serving failed; the serving error wins.
pub async fn serve<S>(app: App, router: Router, listener: TcpListener, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    app.startup().await?;

    let addr = listener.local_addr()?;
    tracing::info!(%addr, "server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;
    tracing::info!("server stopped accepting requests");

    let stopped = app.shutdown().await;
    served?;
    stopped?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}
