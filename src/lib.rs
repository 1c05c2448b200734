pub mod config;
pub mod core;
pub mod handlers;
pub mod routes;
pub mod state;

// Re-export commonly used items for convenience
pub use config::ServerConfig;
pub use crate::core::{Credential, RtMiddleTier, SessionOverrides, Tool, ToolRegistry, ToolResult};
pub use state::AppState;
