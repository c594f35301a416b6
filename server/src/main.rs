mod config;

use config::ServerConfig;
use mcp_tts_audio::register_speech_tools;
use mcp_tts_core::{telemetry, McpServer, ServerInfo, ToolRegistry};
use std::sync::Arc;
use tracing::info;

const INSTRUCTIONS: &str = "Speaks text aloud. Use `say` for the local macOS voice, or \
`elevenlabs`, `google_tts` and `openai_tts` for cloud voices. Calls return once playback \
has finished; cancelling a call stops the audio.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing (stderr; stdout is the protocol)
    let verbose = std::env::var("MCP_TTS_VERBOSE")
        .ok()
        .and_then(|v| config::parse_flag(&v))
        .unwrap_or(false);
    telemetry::init(&telemetry::filter_directive(
        std::env::var("RUST_LOG").ok(),
        verbose,
    ));

    info!(
        target: "mcp_tts",
        version = env!("CARGO_PKG_VERSION"),
        "Starting mcp-tts"
    );

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = ServerConfig::load();
    info!(
        target: "mcp_tts",
        output = ?cfg.output.kind,
        frame_ms = cfg.frame_ms,
        sequential = !cfg.allow_concurrent,
        elevenlabs = cfg.elevenlabs.api_key.is_some(),
        google = cfg.google.api_key.is_some(),
        openai = cfg.openai.api_key.is_some(),
        "Configuration resolved"
    );

    let registry = ToolRegistry::new().with_timeout(cfg.tool_timeout);
    register_speech_tools(&registry, cfg.tool_set(cfg.player()))?;

    let server = Arc::new(
        McpServer::new(
            registry,
            ServerInfo {
                name: "mcp-tts".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )
        .with_instructions(INSTRUCTIONS),
    );

    server.serve_stdio().await?;
    info!(target: "mcp_tts", "Client disconnected; shutting down");
    Ok(())
}
