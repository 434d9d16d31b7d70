use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use broker_api::{ChannelHandler, Outbox, ServerEvent, unix_now_secs};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Почему завершился цикл приёма.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelExit {
    WindowElapsed,
    Cancelled,
    ClosedByServer,
}

// ═══════════════════════════════════════════════════════════════
//  EventChannel: persistent bidirectional channel (WebSocket)
// ═══════════════════════════════════════════════════════════════

/// Одно постоянное соединение с брокером и зарегистрированный обработчик.
///
/// Переподключения нет: обрыв завершает цикл приёма, а решение о
/// дальнейших действиях остаётся за владельцем.
pub struct EventChannel<H: ChannelHandler> {
    ws: Option<WsStream>,
    handler: H,
    url: String,
}

impl<H: ChannelHandler> EventChannel<H> {
    /// Установить соединение и вызвать `on_open` обработчика.
    ///
    /// События, положенные обработчиком в `on_open` (регистрация подписки),
    /// отправляются до возврата; ошибка отправки считается ошибкой подключения.
    pub async fn connect(url: &str, handler: H, timeout: Duration) -> Result<Self, ClientError> {
        let (ws, _resp) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout)??;

        let mut channel = Self {
            ws: Some(ws),
            handler,
            url: url.to_string(),
        };

        let mut out = Outbox::new();
        channel.handler.on_open(&mut out);
        if let Err(e) = channel.flush(&mut out).await {
            channel.close().await;
            return Err(e);
        }
        Ok(channel)
    }

    /// Цикл приёма: до истечения окна, отмены или закрытия сервером.
    ///
    /// Обработчик вызывается синхронно на каждое событие; накопленные им
    /// исходящие события отправляются сразу, ответа на них не ждём.
    pub async fn run_until(
        &mut self,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<ChannelExit, ClientError> {
        let ws = self.ws.as_mut().ok_or(ClientError::Closed)?;
        let handler = &mut self.handler;
        let mut out = Outbox::new();

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(ChannelExit::Cancelled),
                _ = &mut deadline => return Ok(ChannelExit::WindowElapsed),

                frame = ws.next() => {
                    let text = match frame {
                        None => return Ok(ChannelExit::ClosedByServer),
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(_))) => return Ok(ChannelExit::ClosedByServer),
                        Some(Ok(_)) => continue,
                    };

                    dispatch(handler, text.as_str(), &mut out);
                    send_all(ws, &mut out).await?;
                }
            }
        }
    }

    /// Явно закрыть соединение. Повторный вызов ничего не делает.
    pub async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close(None).await {
                tracing::debug!(url = %self.url, error = %e, "close handshake failed");
            }
        }
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    async fn flush(&mut self, out: &mut Outbox) -> Result<(), ClientError> {
        let ws = self.ws.as_mut().ok_or(ClientError::Closed)?;
        send_all(ws, out).await
    }
}

fn dispatch<H: ChannelHandler>(handler: &mut H, text: &str, out: &mut Outbox) {
    match ServerEvent::decode(text) {
        Ok(ServerEvent::Message(msg)) => handler.on_message(msg, unix_now_secs(), out),
        Ok(ServerEvent::Subscribed(data)) => handler.on_subscribed(&data),
        Ok(ServerEvent::Other(name)) => {
            tracing::trace!(event = %name, "ignored event");
        }
        Err(e) => handler.on_malformed(&e),
    }
}

async fn send_all(ws: &mut WsStream, out: &mut Outbox) -> Result<(), ClientError> {
    for event in out.drain() {
        let text = event.encode()?;
        ws.send(Message::Text(text.into())).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::WebSocketUpgrade;
    use axum::extract::ws::{Message as AxMessage, WebSocket};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use broker_api::{ClientEvent, MessageEnvelope, SubscribeRequest, TopicPattern, WireError};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        opened: bool,
        messages: Vec<String>,
        malformed: usize,
        subscribed: usize,
    }

    impl ChannelHandler for Recorder {
        fn on_open(&mut self, out: &mut Outbox) {
            self.opened = true;
            out.push(ClientEvent::Subscribe(SubscribeRequest {
                consumer: "test".into(),
                topics: vec![TopicPattern::Wildcard],
            }));
        }

        fn on_subscribed(&mut self, _data: &serde_json::Value) {
            self.subscribed += 1;
        }

        fn on_message(&mut self, msg: MessageEnvelope, _received_at: f64, _out: &mut Outbox) {
            self.messages.push(msg.message_id);
        }

        fn on_malformed(&mut self, _error: &WireError) {
            self.malformed += 1;
        }
    }

    /// Сервер: ждёт subscribe, шлёт subscribed, два сообщения и мусор между ними.
    async fn scripted(mut socket: WebSocket, seen: Arc<Mutex<Vec<String>>>) {
        if let Some(Ok(AxMessage::Text(t))) = socket.recv().await {
            seen.lock().unwrap().push(t.as_str().to_string());
        }
        let frames = [
            json!({"event": "subscribed", "data": {"status": "ok"}}).to_string(),
            json!({"event": "message", "data": {"topic": "a", "message_id": "m1"}}).to_string(),
            "{not json".to_string(),
            json!({"event": "message", "data": {"topic": "b", "message_id": "m2"}}).to_string(),
        ];
        for f in frames {
            if socket.send(AxMessage::Text(f.into())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(msg)) = socket.recv().await {
            if matches!(msg, AxMessage::Close(_)) {
                break;
            }
        }
    }

    async fn serve(seen: Arc<Mutex<Vec<String>>>) -> String {
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let seen = seen.clone();
                async move { ws.on_upgrade(move |s| scripted(s, seen)).into_response() }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn handler_sees_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let url = serve(seen.clone()).await;

        let mut ch = EventChannel::connect(&url, Recorder::default(), Duration::from_secs(2))
            .await
            .unwrap();
        let exit = ch
            .run_until(Duration::from_millis(300), &CancellationToken::new())
            .await
            .unwrap();
        ch.close().await;
        ch.close().await;

        assert_eq!(exit, ChannelExit::WindowElapsed);
        let h = ch.into_handler();
        assert!(h.opened);
        assert_eq!(h.subscribed, 1);
        assert_eq!(h.messages, vec!["m1", "m2"]);
        assert_eq!(h.malformed, 1);

        let sub = seen.lock().unwrap()[0].clone();
        assert!(sub.contains(r#""event":"subscribe""#));
    }

    #[tokio::test]
    async fn cancelled_token_ends_loop() {
        let url = serve(Arc::new(Mutex::new(Vec::new()))).await;
        let mut ch = EventChannel::connect(&url, Recorder::default(), Duration::from_secs(2))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let exit = ch.run_until(Duration::from_secs(30), &cancel).await.unwrap();
        assert_eq!(exit, ChannelExit::Cancelled);
        ch.close().await;
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let res = EventChannel::connect(
            &format!("ws://{addr}/ws"),
            Recorder::default(),
            Duration::from_secs(2),
        )
        .await;
        assert!(res.is_err());
    }
}
