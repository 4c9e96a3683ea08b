//! Basket MCP Server Binary
//!
//! Entry point for the stdio MCP server. One process serves one vendor,
//! selected by `basket.toml` or `BASKET_VENDOR`.
//!
//! ## Usage
//!
//! ```bash
//! # Rami Levy (REST)
//! BASKET_VENDOR=rami_levy \
//! BASKET_RAMI_LEVY_API_TOKEN=... \
//! BASKET_RAMI_LEVY_ACCOUNT_ID=... basket-mcp
//!
//! # Shufersal (browser-backed), attached to a running browser
//! BASKET_VENDOR=shufersal \
//! BASKET_BROWSER_CDP_ENDPOINT=ws://127.0.0.1:9222/... basket-mcp
//! ```
//!
//! Logs go to stderr; stdout belongs to the MCP transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{transport::stdio, ServiceExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use basket_core::config::{AppConfig, LoadOptions, LogFormat, VendorKind};
use basket_mcp::BasketMcpServer;
use basket_session::{SessionConfig, SessionManager};
use basket_vendors::{KeshetProvider, Provider, RamiLevyProvider, ShufersalProvider};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default()).context("loading configuration")?;
    init_tracing(&config);

    info!(vendor = ?config.vendor, "starting basket MCP server");

    let mut session: Option<Arc<SessionManager>> = None;
    let provider: Arc<dyn Provider> = match config.vendor {
        VendorKind::RamiLevy => Arc::new(RamiLevyProvider::new(config.rami_levy.clone())?),
        VendorKind::Keshet => Arc::new(KeshetProvider::new(config.keshet.clone())?),
        VendorKind::Shufersal => {
            let manager = Arc::new(SessionManager::new(session_config(&config)));
            session = Some(manager.clone());
            Arc::new(ShufersalProvider::new(
                config.shufersal.clone(),
                &config.browser,
                manager,
            )?)
        }
    };

    let server = BasketMcpServer::new(provider);
    let service = server.serve(stdio()).await.context("starting stdio transport")?;

    tokio::select! {
        result = service.waiting() => {
            result.context("transport closed with an error")?;
            info!("client disconnected");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    // Tear the browser session down before exiting so pending client-side
    // cart state is flushed.
    if let Some(session) = session {
        session.release().await;
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    // stdout carries the MCP protocol; all diagnostics go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn session_config(config: &AppConfig) -> SessionConfig {
    let mut session = SessionConfig::new(config.shufersal.base_url.clone());
    session.cdp_endpoint = config.browser.cdp_endpoint.clone();
    session.profile_dir = config.browser.profile_dir.clone();
    session.debug_dir = config.browser.debug_dir.clone();
    session.headless = config.browser.headless;
    session
}
