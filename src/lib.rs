pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod utils;

// Re-export the public surface for callers and integration tests
pub use config::ChatConfig;
pub use connection::{ChatConnection, ChatEvent, ChatListener, ConnectionState, EventReceiver};
pub use error::ChatError;
