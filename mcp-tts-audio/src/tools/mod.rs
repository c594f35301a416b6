//! MCP tools that speak.

pub mod say;
pub mod speech;

pub use say::SayTool;
pub use speech::SpeechTool;

use crate::error::ProviderError;
use crate::player::Player;
use crate::providers::{
    ElevenLabsConfig, ElevenLabsProvider, GoogleConfig, GoogleProvider, OpenAiConfig,
    OpenAiProvider,
};
use mcp_tts_core::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything needed to build the four speech tools
#[derive(Clone)]
pub struct ToolSet {
    pub elevenlabs: ElevenLabsConfig,
    pub google: GoogleConfig,
    pub openai: OpenAiConfig,
    /// Shared by every tool, so they all queue behind the same gate
    pub player: Player,
    pub suppress_output: bool,
    /// Longest a single utterance may speak before it is cut off
    pub playback_limit: Option<Duration>,
}

/// Register `say`, `elevenlabs`, `google_tts` and `openai_tts`.
///
/// Tools are registered even without credentials; a missing key is reported
/// when the tool is called.
pub fn register_speech_tools(registry: &ToolRegistry, set: ToolSet) -> Result<(), ProviderError> {
    let ToolSet {
        elevenlabs,
        google,
        openai,
        player,
        suppress_output,
        playback_limit,
    } = set;

    registry.register(Arc::new(
        SayTool::new(player.clone())
            .suppress_output(suppress_output)
            .playback_limit(playback_limit),
    ));
    registry.register(Arc::new(
        SpeechTool::new(ElevenLabsProvider::new(elevenlabs)?, player.clone())
            .suppress_output(suppress_output)
            .playback_limit(playback_limit),
    ));
    registry.register(Arc::new(
        SpeechTool::new(GoogleProvider::new(google)?, player.clone())
            .suppress_output(suppress_output)
            .playback_limit(playback_limit),
    ));
    registry.register(Arc::new(
        SpeechTool::new(OpenAiProvider::new(openai)?, player)
            .suppress_output(suppress_output)
            .playback_limit(playback_limit),
    ));

    info!(target: "speech", tools = registry.len(), "Speech tools registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{OutputConfig, OutputKind};

    #[test]
    fn test_registers_all_four() {
        let registry = ToolRegistry::new();
        let set = ToolSet {
            elevenlabs: ElevenLabsConfig::default(),
            google: GoogleConfig::default(),
            openai: OpenAiConfig::default(),
            player: Player::new(OutputConfig {
                kind: OutputKind::Silent,
                ..Default::default()
            }),
            suppress_output: false,
            playback_limit: None,
        };
        register_speech_tools(&registry, set).unwrap();

        let names: Vec<String> = registry.list_tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["elevenlabs", "google_tts", "openai_tts", "say"]);
        for tool in registry.list_tools() {
            assert_eq!(tool.parameters()["required"], serde_json::json!(["text"]));
        }
    }
}
