mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use amity_api::{AppState, LineChannel};
use amity_db::Database;
use amity_engine::ChatEngine;
use amity_engine::completion::HttpCompletionClient;
use amity_engine::transform::HttpTextTransform;
use amity_engine::transport::LineTransport;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amity=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if !config.has_completion_credentials() {
        eprintln!("FATAL: COMPLETION_ACCESS_KEY_ID or COMPLETION_SECRET_KEY is unset.");
        eprintln!("       Both are needed to sign requests to the completion service.");
        eprintln!("       Set them in your .env file and restart.");
        std::process::exit(1);
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let completion = Arc::new(HttpCompletionClient::new(config.completion.clone())?);
    let mut engine = ChatEngine::new(db, completion, config.engine.clone());
    match &config.text_transform_url {
        Some(url) => {
            info!("Text transform enabled via {}", url);
            let transform = HttpTextTransform::new(url.clone(), config.engine.upstream_timeout)?;
            engine = engine.with_transform(Arc::new(transform));
        }
        None => info!("Text transform disabled, replies pass through unchanged"),
    }

    let mut state = AppState::new(Arc::new(engine));
    match &config.line {
        Some(line) => {
            let transport = LineTransport::new(line.access_token.clone())?;
            let channel = LineChannel::new(line.channel_secret.clone(), Arc::new(transport))
                .with_welcome(line.bot_name.clone(), line.setup_url.clone());
            state = state.with_line(channel);
            info!("LINE webhook enabled, setup page {}", line.setup_url);
        }
        None => warn!("LINE credentials unset, /webhook/line answers 404"),
    }

    let app = amity_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Amity server listening on {}", addr);
    info!(
        "History window {} messages, upstream timeout {}s",
        config.engine.history_window,
        config.engine.upstream_timeout.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
