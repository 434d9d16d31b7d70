//! Контракт брокера, который потребляет нагрузочный harness.
//!
//! Здесь только то, что видно снаружи брокера: схема publish-запроса,
//! события постоянного канала, паттерны подписки и интерфейс обработчика
//! событий. Логика брокера сюда не входит.

pub mod error;
pub mod handler;
pub mod topic;
pub mod util;
pub mod wire;

pub use error::WireError;
pub use handler::{ChannelHandler, Outbox};
pub use topic::{TopicPattern, WILDCARD};
pub use util::{latency_between, unix_now_secs};
pub use wire::{
    ClientEvent, ConsumedAck, MessageBody, MessageEnvelope, PublishRequest, ServerEvent,
    SubscribeRequest, send_timestamp,
};
