use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};

use stockdata_mcp::config::Config;
use stockdata_mcp::data::yahoo::YahooProvider;
use stockdata_mcp::data::Downloader;
use stockdata_mcp::server::{self, StockDataServer};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let downloader: Arc<dyn Downloader> = Arc::new(YahooProvider::from_config(&config)?);
    tracing::info!(base_url = %config.yahoo_base_url, "Yahoo Finance provider configured");

    if let Some(port) = config.port {
        // HTTP mode for remote clients
        let app = server::http_router(downloader);

        let addr = format!("0.0.0.0:{port}");
        tracing::info!("Starting stockdata-mcp HTTP server on {addr}");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    } else {
        // stdio mode for local MCP clients
        tracing::info!("Starting stockdata-mcp MCP server (stdio)");

        let server = StockDataServer::new(downloader);
        let service = server.serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
    }

    Ok(())
}
