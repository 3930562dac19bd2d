pub mod config;
pub mod core;
pub mod session;

// Re-export commonly used items for convenience
pub use config::LiveConfig;
pub use crate::core::*;
pub use session::{GeminiLiveTransport, TransportSettings};
