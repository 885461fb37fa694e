use std::{net::SocketAddr, sync::Arc};

use adcase_core::{Config, Pipeline};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod routes;

const DEFAULT_PORT: u16 = 8080;

fn bind_addr() -> Result<SocketAddr> {
    if let Ok(addr) = std::env::var("BIND_ADDR") {
        return addr
            .parse()
            .with_context(|| format!("BIND_ADDR {addr:?} is not a socket address"));
    }
    let port = match std::env::var("PORT") {
        Ok(port) => port
            .parse::<u16>()
            .with_context(|| format!("PORT {port:?} is not a port number"))?,
        Err(_) => DEFAULT_PORT,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        provider = config.provider.name(),
        model = %config.model,
        out_dir = %config.out_dir.display(),
        format = ?config.output_format,
        frame_sampling = config.frame_sampling,
        "Configuration loaded"
    );
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    let app = routes::router(pipeline);

    let addr = bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("adcase listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down gracefully");
        })
        .await
        .context("running HTTP server")?;

    Ok(())
}
