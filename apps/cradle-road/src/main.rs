use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use cradle_road::config::ServerConfig;
use cradle_road::routes::router;
use cradle_road::state::AppState;
use cradle_road::store::ExchangeStore;
use cradle_road::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_tracing(&config.log_filter);

    let build_id = config.build_id();
    let store = Arc::new(ExchangeStore::with_room_limit(config.max_rooms));
    let state = AppState::with_store(store, config.app_name.as_str(), build_id.as_str());
    let app = router(state, &config.api_prefix);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        prefix = %config.api_prefix,
        app_name = %config.app_name,
        build_id = %build_id,
        max_rooms = config.max_rooms,
        "cradle-road listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("cradle-road stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
    }
}
