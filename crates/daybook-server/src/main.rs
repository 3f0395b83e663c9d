mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use daybook_api::{AppStateInner, router};
use daybook_core::analysis::ChatCompletionClient;
use daybook_core::question::SheetQuestionSource;
use daybook_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "daybook=debug,daybook_api=debug,daybook_core=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    if config.sheet.sheet_id.is_empty() {
        warn!("DAYBOOK_SHEET_ID is not set, every day will use a fallback question");
    }
    let source = SheetQuestionSource::new(config.sheet.clone())?;
    let generator = Arc::new(ChatCompletionClient::new(config.llm.clone())?);

    let state = AppStateInner::build(
        db,
        source,
        generator,
        config.generation_timeout,
        config.jwt_secret.clone(),
    )
    .await?;
    info!("Question cursor at {}", state.sequencer().cursor().await);

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Daybook server listening on {}", config.addr);
    info!(
        "Analysis model {} at {}, generation timeout {}s",
        config.llm.model,
        config.llm.base_url,
        config.generation_timeout.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
