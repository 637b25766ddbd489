use anyhow::{Context, Result};
use clap::Parser;
use interview_api::{AppState, Config, router};
use interview_session_client::HttpSessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Websocket gateway for spoken mock interviews")]
struct Cli {
    /// Address to listen on; overrides BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Interview API base URL; overrides INTERVIEW_API_BASE_URL
    #[arg(long)]
    api_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let args = Cli::parse();
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(base_url) = args.api_base_url {
        config.api_base_url = base_url;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    info!("Configuration loaded. Interview API at {}", config.api_base_url);

    // --- 3. Initialize the session store ---
    let client_config = interview_session_client::Config::builder()
        .with_base_url(&config.api_base_url);
    let client_config = match &config.api_token {
        Some(token) => client_config.with_api_token(token),
        None => client_config.without_api_token(),
    };
    let store = Arc::new(
        HttpSessionStore::new(client_config.build())
            .context("Failed to build the interview API client")?,
    );
    let state = AppState::new(store.clone(), store, config.turn.clone());

    // Configure a permissive CORS policy so the interview page can connect
    // from the platform's own origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!("Starting WebSocket server, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
