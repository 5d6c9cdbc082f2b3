use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chameleon::{
    config::{RelayConfig, ServerConfig},
    llm::LlmConfig,
    state::AppState,
    ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chameleon=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chameleon relay...");

    let server_config = ServerConfig::from_env();
    let relay_config = RelayConfig::from_env();
    let llm_config = LlmConfig::from_env();

    // The generator is the whole point of the relay, so a broken config
    // is fatal at startup rather than a degraded mode.
    let generator = match llm_config.build_generator() {
        Ok(generator) => {
            tracing::info!("generation provider initialized");
            generator
        }
        Err(e) => {
            tracing::error!("Failed to initialize generation provider: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let (state, hub) = AppState::new(relay_config, generator, shutdown.clone());
    let state = Arc::new(state);

    // Long-lived fan-out task
    let hub_task = hub.spawn(shutdown.child_token());

    let cors = if server_config.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = server_config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route("/chat", get(ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", server_config.listen_addr);

    let listener = tokio::net::TcpListener::bind(server_config.listen_addr)
        .await
        .unwrap();

    // Ctrl-C cancels the token, which stops the hub, every per-session
    // loop, and the accept loop below.
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let graceful = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await
        .unwrap();

    shutdown.cancel();
    let _ = hub_task.await;
    tracing::info!("Shutdown complete");
}
