use broker_api::WireError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http: {0}")]
    Http(reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("timed out")]
    Timeout,

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("wire: {0}")]
    Wire(#[from] WireError),

    #[error("channel closed")]
    Closed,
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Http(e)
        }
    }
}
