use std::net::SocketAddr;

use candidate_test_session::{
    config::{get_config, init_config},
    middleware::cors::session_cors,
    router, AppState,
};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let state = AppState::from_config(config)?;
    info!("Assignment API at {}", config.assignment_api_url);
    let _sweeper = state.sessions.spawn_sweeper();

    let app = router(state, config.public_rps)
        .layer(session_cors())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
