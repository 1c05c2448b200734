use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use realtime_relay::{
    ServerConfig,
    core::relay::RtMiddleTier,
    core::tools::{HttpTool, ToolRegistry},
    routes,
    state::AppState,
};

/// Realtime relay - middle tier between realtime clients and the upstream model
#[derive(Parser, Debug)]
#[command(name = "realtime-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must be installed before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let mut registry = ToolRegistry::new();
    for tool in &config.tools {
        registry
            .register(HttpTool::new(tool.clone()))
            .map_err(|e| anyhow!("Failed to register tool {}: {}", tool.name, e))?;
    }
    info!(
        tools = registry.len(),
        managed_identity = config.uses_managed_identity(),
        deployment = %config.azure_openai_deployment,
        "Relay configured"
    );

    let relay = RtMiddleTier::new(config.upstream_config(), config.session_overrides(), registry);
    let app_state = AppState::new(relay);
    let app = routes::create_app(app_state, config.static_dir.as_deref());

    let address = config.address();
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
