/// Ошибка кодирования/декодирования событий канала.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Фрейм не является JSON-объектом вида `{"event": ..., "data": ...}`.
    #[error("frame: {0}")]
    Frame(#[source] serde_json::Error),

    /// Событие распознано, но его payload не соответствует схеме.
    #[error("'{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),
}

impl WireError {
    /// Имя события, если фрейм удалось разобрать хотя бы до тега.
    pub fn event(&self) -> Option<&str> {
        match self {
            WireError::Payload { event, .. } => Some(event),
            _ => None,
        }
    }
}
