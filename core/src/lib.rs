// mcp-tts core library
// Stdio MCP server runtime shared by the speech tools

pub mod mcp;
pub mod telemetry;
pub mod tools;

// Export core types
pub use mcp::{McpError, McpServer, ServerInfo};
pub use tools::{Tool, ToolError, ToolRegistry, ToolResult};
