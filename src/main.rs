use std::sync::Arc;

use pool_lifespan::{
    App, Database, load_config, run_sql,
    server::{router, serve, shutdown_signal},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init()?;

    // Load configuration using lib.rs method
    let config = load_config()?;
    tracing::info!("Loaded configuration:\n{}", config);

    let mut app = App::new();
    let mut builder = Database::builder(config.database.connection_string())
        .options(config.database.driver_options());

    if let Some(sql) = config.database.init_sql.as_deref() {
        let sql: Arc<str> = Arc::from(sql);
        builder = builder.init(move |conn| run_sql(Arc::clone(&sql), conn));
    }
    let db = builder.register(&mut app);

    let listener = TcpListener::bind(config.server.addr()?).await?;
    serve(app, router(db), listener, shutdown_signal()).await?;

    Ok(())
}
