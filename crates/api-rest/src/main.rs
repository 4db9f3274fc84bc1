//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the CDS REST facade on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `cds-run` binary serves the same
//! router.

use cds_core::config::config_from_env_values;
use cds_core::CdsClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CDS REST API server
///
/// # Environment Variables
/// - `CDS_BASE_URL`: Decision-support backend base URL (required)
/// - `CDS_REQUEST_TIMEOUT_SECS`: HTTP timeout in seconds (default: 30)
/// - `CDS_APP_REGISTRY_FILE`: YAML file of launchable SMART apps (optional)
/// - `CDS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the CDS configuration is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CDS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting CDS REST API on {}", addr);

    let cfg = config_from_env_values(
        std::env::var("CDS_BASE_URL").ok(),
        std::env::var("CDS_REQUEST_TIMEOUT_SECS").ok(),
        std::env::var("CDS_APP_REGISTRY_FILE").ok(),
    )?;
    tracing::info!("-- CDS backend at {}", cfg.base_url());

    api_rest::serve(&addr, CdsClient::from_config(cfg)?).await
}
