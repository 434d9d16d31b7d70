use serde_json::Value;

use crate::error::WireError;
use crate::wire::{ClientEvent, MessageEnvelope};

// ════════════════════════════════════════════════════════════════
//  Channel Handler
// ════════════════════════════════════════════════════════════════

/// Исходящие события, накопленные обработчиком за один callback.
///
/// Канал отправляет их сразу после возврата из callback'а,
/// подтверждения от сервера не ждёт.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<ClientEvent>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ClientEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, ClientEvent> {
        self.events.drain(..)
    }
}

/// Обработчик событий постоянного канала.
///
/// Регистрируется в клиенте канала при создании соединения. Цикл приёма
/// вызывает методы синхронно, по одному на событие, в порядке поступления.
pub trait ChannelHandler: Send {
    /// Соединение установлено. Здесь отправляется регистрация подписки.
    fn on_open(&mut self, out: &mut Outbox);

    /// Сервер подтвердил регистрацию.
    fn on_subscribed(&mut self, _data: &Value) {}

    /// Доставлено сообщение. `received_at`: Unix-время приёма в секундах.
    fn on_message(&mut self, msg: MessageEnvelope, received_at: f64, out: &mut Outbox);

    /// Фрейм или payload события не разобран. Соединение не закрывается.
    fn on_malformed(&mut self, _error: &WireError) {}
}
