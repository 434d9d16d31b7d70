use std::collections::BTreeSet;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use broker_api::{MessageEnvelope, PublishRequest};

use crate::state::BrokerState;

// ═══════════════════════════════════════════════════════════════
//  POST /publish
// ═══════════════════════════════════════════════════════════════

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg}))).into_response()
}

pub(crate) async fn handle_publish(State(state): State<BrokerState>, body: String) -> Response {
    if state.rejects_publish() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "publishing disabled"})),
        )
            .into_response();
    }

    let req: PublishRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => return bad_request(&format!("invalid body: {e}")),
    };
    if req.topic.is_empty() || req.message_id.is_empty() || req.producer.is_empty() {
        return bad_request("topic, message_id and producer are required");
    }

    let delivered = state.publish(MessageEnvelope::from(req)).await;
    tracing::trace!(delivered, "published");
    Json(json!({"status": "ok"})).into_response()
}

// ═══════════════════════════════════════════════════════════════
//  Inspection
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

pub(crate) async fn handle_clients(State(state): State<BrokerState>) -> impl IntoResponse {
    Json(state.clients().await)
}

pub(crate) async fn handle_messages(State(state): State<BrokerState>) -> impl IntoResponse {
    Json(state.messages().await)
}

pub(crate) async fn handle_consumptions(State(state): State<BrokerState>) -> impl IntoResponse {
    Json(state.consumptions().await)
}

/// Граф producer → topic → consumer по журналу сообщений и подтверждений.
pub(crate) async fn handle_graph(State(state): State<BrokerState>) -> impl IntoResponse {
    let messages = state.messages().await;
    let consumptions = state.consumptions().await;

    let producers: BTreeSet<&str> = messages.iter().map(|m| m.producer.as_str()).collect();
    let topics: BTreeSet<&str> = messages.iter().map(|m| m.topic.as_str()).collect();
    let consumers: BTreeSet<&str> = consumptions.iter().map(|c| c.consumer.as_str()).collect();

    let publishes: BTreeSet<(&str, &str)> = messages
        .iter()
        .map(|m| (m.producer.as_str(), m.topic.as_str()))
        .collect();
    let consumes: BTreeSet<(&str, &str)> = consumptions
        .iter()
        .map(|c| (c.topic.as_str(), c.consumer.as_str()))
        .collect();

    let edges: Vec<Value> = publishes
        .iter()
        .map(|(p, t)| json!({"from": p, "to": t, "kind": "publish"}))
        .chain(
            consumes
                .iter()
                .map(|(t, c)| json!({"from": t, "to": c, "kind": "consume"})),
        )
        .collect();

    Json(json!({
        "producers": producers,
        "topics": topics,
        "consumers": consumers,
        "edges": edges,
    }))
}
