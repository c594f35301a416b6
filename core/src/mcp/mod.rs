/// Model Context Protocol (MCP) server
///
/// Exposes the registered tools to an MCP client over stdio.
///
/// Architecture:
/// - `types`: MCP protocol types (JSON-RPC 2.0 based)
/// - `server`: line-delimited stdio server loop
pub mod server;
pub mod types;

pub use server::McpServer;
pub use types::{
    CallToolResult, McpError, McpTool, ServerInfo, ToolContent, LATEST_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
