//! Depth Feed - Market Depth Service
//!
//! Connects to the exchange WebSocket feed, keeps the subscribed market's
//! order book and publishes depth ladders to the chart consumer.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use depth_feed::publisher::IpcPublisher;
use depth_feed::websocket::FEED_CHANNEL_CAPACITY;
use depth_feed::{
    AppState, Config, ConsumerSink, FeedMetrics, Market, MarketDataError, MarketSession,
    SnapshotPublisher, StreamConnection,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Depth Feed");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(endpoint = %config.ws_endpoint, market = ?config.market, "Configuration loaded");

    let metrics = FeedMetrics::new()?;

    // Connection -> session -> publisher
    let (feed_tx, feed_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let (stream, connection_task) = StreamConnection::spawn(&config, feed_tx, metrics.clone());
    let (session, session_handle) =
        MarketSession::new(stream.clone(), feed_rx, config.depth_levels, config.min_precision);
    let session_task = session.spawn();

    let sink = match &config.ipc_socket_path {
        Some(path) => ConsumerSink::Ipc(IpcPublisher::new(path).await),
        None => ConsumerSink::Log,
    };
    let publisher_task = SnapshotPublisher::new(
        session_handle.clone(),
        sink,
        config.sample_interval(),
        metrics.clone(),
    )
    .spawn();

    if let Some(name) = &config.market {
        let market: Market = name.parse()?;
        session_handle.set_market(market).await?;
    }

    let state = Arc::new(AppState {
        session: session_handle.clone(),
        stream: stream.clone(),
        metrics,
        config: config.clone(),
    });

    // Start HTTP server for health, metrics and market control
    let http_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_http_server(http_state).await {
            warn!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    session_handle.shutdown().await.ok();
    stream.shutdown().ok();
    let _ = session_task.await;
    let _ = connection_task.await;
    publisher_task.abort();

    Ok(())
}

/// Start HTTP server for health checks, metrics and market control
async fn start_http_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/market", get(current_market).put(set_market).delete(clear_market))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.http_port));
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connection = state
        .stream
        .state()
        .await
        .map(|s| s.to_string())
        .unwrap_or_else(|_| "STOPPED".to_string());

    Json(serde_json::json!({
        "status": "healthy",
        "component": "depth-feed",
        "connection": connection,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn current_market(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.session.current_market().await {
        Ok(market) => (StatusCode::OK, Json(serde_json::json!({ "market": market }))),
        Err(e) => error_response(e),
    }
}

async fn set_market(
    State(state): State<Arc<AppState>>,
    Json(market): Json<Market>,
) -> impl IntoResponse {
    match state.session.set_market(market).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "market": market }))),
        Err(e) => error_response(e),
    }
}

async fn clear_market(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.session.clear_market().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "market": null }))),
        Err(e) => error_response(e),
    }
}

fn error_response(err: MarketDataError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        MarketDataError::UnknownMarket(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}
