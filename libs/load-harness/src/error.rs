use broker_client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("config: {0}")]
    Config(String),

    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
