mod config;
mod metrics;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use extract::{OllamaClient, OllamaExtractor, RetryPolicy};
use index::InMemoryPageStore;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.server.log_format);

    let client = OllamaClient::new(config.llm.base_url.clone(), config.llm.model.clone())
        .with_retry(RetryPolicy::from_config(&config.retry));
    let capability = Arc::new(OllamaExtractor::new(client));
    let store = Arc::new(InMemoryPageStore::new());

    let state = AppState::new(&config, capability, store);
    let _sweeper = state.service.spawn_sweeper();

    let app = routes::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!(
        addr = %config.server.bind_addr,
        model = %config.llm.model,
        algorithm = %config.graph.algorithm,
        "Server listening"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
