use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use hayloft_common::{access_log, cors};
use owo_colors::OwoColorize;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::fetch;

pub async fn run(cancel: CancellationToken, port: u16, app: App) -> Result<()> {
    let health_router = Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(health));
    let router = Router::new()
        .route("/", get(banner).post(handle_fetch))
        .with_state(app)
        .layer(middleware::from_fn(access_log::public))
        .layer(cors::dev());
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .expect("Invalid address");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!(
        "{}{}",
        "🚀 Report proxy listening on port ".green(),
        port.green().dimmed()
    );
    let start = std::time::Instant::now();
    axum::serve(listener, health_router.merge(router))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .context("Failed to serve report proxy")?;
    println!(
        "{} {} {}",
        "🛑 Report proxy shut down gracefully".red(),
        "• uptime was".red(),
        humantime::format_duration(start.elapsed()).red().dimmed()
    );
    Ok(())
}

async fn health() -> impl IntoResponse {
    StatusCode::OK.into_response()
}

async fn banner() -> &'static str {
    "Nothing to see here"
}

async fn handle_fetch(
    State(app): State<App>,
    Json(query): Json<serde_json::Value>,
) -> impl IntoResponse {
    match fetch::forward(&app, query).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) if e.is_retryable() => {
            eprintln!(
                "fetch failed: {e}; is your anisette container running and accepting connections?"
            );
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        Err(e) => {
            eprintln!("fetch failed: {e}");
            StatusCode::NOT_IMPLEMENTED.into_response()
        }
    }
}
