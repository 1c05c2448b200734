pub mod credentials;
pub mod relay;
pub mod tools;

pub use credentials::{Credential, CredentialError, TokenProvider};
pub use relay::{RelayError, RtMiddleTier, SessionOverrides, UpstreamConfig};
pub use tools::{FnTool, Tool, ToolError, ToolRegistry, ToolResult, ToolResultDirection};
