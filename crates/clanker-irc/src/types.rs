pub use clanker_core::ports::{ConnectionState, IncomingChat, ModerationEvent};
