use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde_json::{json, Value};

use crate::gocd::GoCdClient;
use crate::handlers::Handlers;
use crate::slack::SlackClient;

pub type AppState = Arc<Handlers<GoCdClient, SlackClient>>;

/// Run the webhook ingress until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Snitch listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/api/webhooks", post(webhook))
        .with_state(state)
}

async fn status() -> Json<Value> {
    Json(json!({"status": "SNITCH - OK"}))
}

/// A webhook is always acknowledged: a failure to notify for one event must
/// never make the CI server retry or queue up.
async fn webhook(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    state.handle(&body).await;
    Json(json!({"status": "OK"}))
}
