pub mod channel;
pub mod error;
pub mod inspect;
pub mod publish;

pub use channel::{ChannelExit, EventChannel};
pub use error::ClientError;
pub use inspect::{EndpointProbe, INSPECTION_ENDPOINTS, Inspector};
pub use publish::PublishClient;
