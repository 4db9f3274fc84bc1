use cds_core::config::config_from_env_values;
use cds_core::CdsClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CDS application
///
/// Resolves the CDS configuration once and serves the REST facade.
///
/// # Environment Variables
/// - `CDS_BASE_URL`: Decision-support backend base URL (required, no default)
/// - `CDS_REQUEST_TIMEOUT_SECS`: HTTP timeout in seconds (default: 30)
/// - `CDS_APP_REGISTRY_FILE`: YAML file of launchable SMART apps (optional)
/// - `CDS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cds_run=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("cds_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CDS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let cfg = config_from_env_values(
        std::env::var("CDS_BASE_URL").ok(),
        std::env::var("CDS_REQUEST_TIMEOUT_SECS").ok(),
        std::env::var("CDS_APP_REGISTRY_FILE").ok(),
    )?;

    tracing::info!("++ CDS backend at {}", cfg.base_url());
    tracing::info!("++ Starting CDS REST on {}", rest_addr);

    let client = CdsClient::from_config(cfg)?;
    api_rest::serve(&rest_addr, client).await
}
