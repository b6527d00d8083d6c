//! Webhook ingress: Telegram POSTs updates to `/telegram`, authenticated by
//! the secret token header registered with `setWebhook`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use ember_telegram::Update;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::App;
use crate::config::WebhookConfig;
use crate::handlers;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
struct WebhookState {
    app: Arc<App>,
    secret: Arc<str>,
}

pub fn router(app: Arc<App>, secret: &str) -> Router {
    let state = WebhookState {
        app,
        secret: Arc::from(secret),
    };
    Router::new()
        .route("/telegram", post(receive_update))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(app: Arc<App>, config: WebhookConfig, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!("Webhook listening on {}", config.listen);
    axum::serve(listener, router(app, &config.secret))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    info!("Webhook stopped");
    Ok(())
}

async fn receive_update(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    let authorized = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == &*state.secret);
    if !authorized {
        return StatusCode::UNAUTHORIZED;
    }
    // Answer right away; Telegram retries slow deliveries.
    tokio::spawn(async move {
        handlers::dispatch(&state.app, update).await;
    });
    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}
