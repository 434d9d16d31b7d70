use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde_json::json;
use tokio::sync::mpsc;

use broker_api::{ClientEvent, ServerEvent};

use crate::state::BrokerState;

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<BrokerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(socket, state))
}

const CLIENT_BUFFER: usize = 4096;

async fn ws_connection(mut socket: WebSocket, state: BrokerState) {
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_BUFFER);
    let mut registered: Option<u64> = None;

    loop {
        tokio::select! {
            biased;

            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(t))) => t,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };

                let event: ClientEvent = match serde_json::from_str(text.as_str()) {
                    Ok(ev) => ev,
                    Err(e) => {
                        let err = json!({"event": "error", "data": {"error": format!("parse: {e}")}});
                        let _ = socket.send(Message::Text(err.to_string().into())).await;
                        continue;
                    }
                };

                match event {
                    ClientEvent::Subscribe(req) => {
                        if let Some(old) = registered.take() {
                            state.unregister(old).await;
                        }
                        let topics: Vec<String> = req.topics.iter().map(|p| p.as_wire().to_string()).collect();
                        let id = state.register(req.consumer, req.topics, tx.clone()).await;
                        registered = Some(id);

                        let ack = ServerEvent::Subscribed(json!({"status": "ok", "topics": topics}));
                        let Ok(frame) = ack.encode() else { continue };
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    ClientEvent::Consumed(ack) => state.record_consumption(ack).await,
                }
            }

            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(id) = registered {
        state.unregister(id).await;
    }
}
