//! Inbound webhook HTTP surface.
//!
//! `GET /` is a health check, `POST /webhook` receives Telegram updates, and
//! everything else is 404. Once the secret header matches, the response is
//! always `200 ok`: Telegram retries any non-2xx delivery, which would
//! double-process the update.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use tracing::instrument;

use relay_core::{events::RelayEvent, relay::Relay};

use crate::update::parse_update;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct WebhookState {
    pub relay: Arc<Relay>,
    pub webhook_secret: Arc<str>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(health).fallback(not_found))
        .route("/webhook", post(handle_webhook).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

#[instrument(name = "telegram.webhook", skip_all)]
async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let token = headers.get(SECRET_HEADER).map(|v| v.as_bytes());
    if token != Some(state.webhook_secret.as_bytes()) {
        state.relay.events().emit(RelayEvent::Unauthorized);
        return (StatusCode::UNAUTHORIZED, "unauthorized");
    }

    match parse_update(&body) {
        Ok(update) => state.relay.handle_update(update).await,
        Err(reason) => state.relay.events().emit(RelayEvent::UpdateIgnored {
            reason: reason.to_string(),
        }),
    }

    (StatusCode::OK, "ok")
}
