pub mod commands;
pub mod error;
pub mod reconnect;
pub mod transport;
pub mod types;

pub use error::IrcError;
pub use transport::{AuthTokenStorage, Transport, TransportConfig};
pub use types::ConnectionState;
