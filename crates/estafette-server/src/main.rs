use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use estafette_server::{Server, ServerConfig};
use estafette_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,estafette_server=debug")),
        )
        .init();

    let config = ServerConfig::from_env();

    let database = match &config.db_path {
        Some(path) => Database::open_at(path).context("opening database")?,
        None => Database::new().context("opening database")?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Database ready");
    }

    let server = Server::bind(&config, database)
        .await
        .context("binding listener")?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger().await;
        }
    });

    server.run().await.context("server loop")?;
    Ok(())
}
