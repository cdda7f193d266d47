use std::error::Error;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod config;
mod handlers;
mod llm;
mod prompts;
mod records;
mod state;
mod utils;

use config::CONFIG;
use state::AppState;
use utils::logging::init_logging;

type MainResult = Result<(), Box<dyn Error + Send + Sync>>;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> MainResult {
    dotenv().ok();
    let _guards = init_logging();

    let state = AppState::from_config();
    match state.generator.as_deref() {
        Some(generator) => info!("Text generator configured: openai model={}", generator.model()),
        None => warn!("OPENAI_API_KEY not set; prompts will be filled from structure skeletons"),
    }
    if CONFIG.airtable_base_id.is_empty() || CONFIG.airtable_api_key.is_empty() {
        warn!("Airtable credentials are missing; /generate-prompts will fail until they are set");
    }
    info!(
        "Preference exploration rate: {} (optimizer service: {})",
        CONFIG.preference_exploration_rate, CONFIG.optimizer_service_url
    );
    if !CONFIG.service_url.is_empty() {
        info!("Public service URL: {}", CONFIG.service_url);
    }
    info!("Max prompts per request: {}", CONFIG.max_prompts_per_request);

    let app = handlers::router(state);
    let listener = TcpListener::bind((CONFIG.host.as_str(), CONFIG.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
