pub mod context;
pub mod coordinator;
pub mod error;
pub mod trigger;

pub use context::ContextManager;
pub use coordinator::Coordinator;
pub use error::{EngineError, Result};
pub use trigger::{ConfigCache, TriggerEngine};
