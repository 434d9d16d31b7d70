use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WireError;
use crate::topic::TopicPattern;

// ════════════════════════════════════════════════════════════════
//  Request/response: POST /publish
// ════════════════════════════════════════════════════════════════

/// Тело publish-запроса. Брокер отвечает 200 при успехе.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    pub message_id: String,
    pub producer: String,
    pub message: Value,
}

/// Payload, который harness кладёт в `message`.
///
/// `timestamp`: секунды Unix-времени (дробные) в момент отправки.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub index: u64,
    pub publisher: u32,
    pub timestamp: f64,
}

/// Извлечь метку отправки из payload'а.
///
/// Поле `timestamp` может быть числом или числовой строкой. Отсутствие поля,
/// ноль, отрицательное или нечисловое значение означают "нет данных о
/// latency" (`None`), а не нулевую latency.
pub fn send_timestamp(payload: &Value) -> Option<f64> {
    let ts = match payload.get("timestamp")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (ts.is_finite() && ts > 0.0).then_some(ts)
}

// ════════════════════════════════════════════════════════════════
//  Persistent channel: client → server
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub consumer: String,
    pub topics: Vec<TopicPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedAck {
    pub consumer: String,
    pub topic: String,
    pub message_id: String,
    pub message: Value,
}

/// Событие клиента. На проводе это плоский объект с тегом `event`:
/// `{"event":"subscribe","consumer":"...","topics":["*"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Subscribe(SubscribeRequest),
    Consumed(ConsumedAck),
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }
}

// ════════════════════════════════════════════════════════════════
//  Persistent channel: server → client
// ════════════════════════════════════════════════════════════════

/// Доставленное сообщение (`message` event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub topic: String,
    pub message_id: String,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub message: Value,
}

impl MessageEnvelope {
    /// `data` приходит объектом либо JSON-строкой с объектом внутри.
    pub fn from_data(data: Value) -> Result<Self, serde_json::Error> {
        match data {
            Value::String(s) => serde_json::from_str(&s),
            other => serde_json::from_value(other),
        }
    }
}

impl From<PublishRequest> for MessageEnvelope {
    fn from(req: PublishRequest) -> Self {
        Self {
            topic: req.topic,
            message_id: req.message_id,
            producer: req.producer,
            message: req.message,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    // Широковещательный канал брокера называет поле `event_type`.
    #[serde(alias = "event_type")]
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Serialize)]
struct RawFrameRef<'a, T: Serialize> {
    event: &'a str,
    data: &'a T,
}

/// Событие сервера. На проводе: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Подтверждение регистрации, содержимое не интерпретируется.
    Subscribed(Value),
    Message(MessageEnvelope),
    /// Любое другое имя события.
    Other(String),
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let frame: RawFrame = serde_json::from_str(text).map_err(WireError::Frame)?;
        match frame.event.as_str() {
            "subscribed" => Ok(ServerEvent::Subscribed(frame.data)),
            "message" => MessageEnvelope::from_data(frame.data)
                .map(ServerEvent::Message)
                .map_err(|source| WireError::Payload { event: frame.event, source }),
            _ => Ok(ServerEvent::Other(frame.event)),
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        let out = match self {
            ServerEvent::Subscribed(data) => {
                serde_json::to_string(&RawFrameRef { event: "subscribed", data })
            }
            ServerEvent::Message(msg) => {
                serde_json::to_string(&RawFrameRef { event: "message", data: msg })
            }
            ServerEvent::Other(name) => {
                serde_json::to_string(&RawFrameRef { event: name, data: &Value::Null })
            }
        };
        out.map_err(WireError::Encode)
    }
}
