pub mod client;
pub mod error;
pub mod health;
mod model_cache;
pub mod prompt;
mod sanitize;

pub use client::OllamaClient;
pub use error::{InferenceError, Result};
pub use health::ServiceHealth;
