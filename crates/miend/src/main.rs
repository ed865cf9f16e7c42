use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use mien_core::{ArtifactBundle, Pipeline};

mod config;
mod server;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("miend starting");

    let config = Config::from_env()?;

    // All artifacts load before the socket opens; a broken artifact
    // directory is a startup failure, never a per-request surprise.
    let bundle = ArtifactBundle::load(&config.artifact_dir).with_context(|| {
        format!("loading artifacts from {}", config.artifact_dir.display())
    })?;
    let pipeline = Pipeline::new(Arc::new(bundle));

    let app = server::create_router(pipeline);
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, "miend ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("miend shutting down");
        })
        .await?;

    Ok(())
}
