use crate::engine::{CancelFlag, PlaybackOutcome};
use crate::player::Player;
use crate::providers::SpeechProvider;
use async_trait::async_trait;
use mcp_tts_core::{Tool, ToolResult};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Exposes a [`SpeechProvider`] as an MCP tool: resolve, synthesize, play.
pub struct SpeechTool<P> {
    provider: P,
    player: Player,
    suppress_output: bool,
    playback_limit: Option<Duration>,
}

impl<P: SpeechProvider> SpeechTool<P> {
    pub fn new(provider: P, player: Player) -> Self {
        Self {
            provider,
            player,
            suppress_output: false,
            playback_limit: None,
        }
    }

    /// Answer "Speech completed" instead of echoing the text
    pub fn suppress_output(mut self, suppress: bool) -> Self {
        self.suppress_output = suppress;
        self
    }

    /// Stop speaking after `limit` (waiting for the speech gate included) and
    /// answer "Speech cancelled"
    pub fn playback_limit(mut self, limit: Option<Duration>) -> Self {
        self.playback_limit = limit;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: SpeechProvider> Tool for SpeechTool<P> {
    fn name(&self) -> String {
        self.provider.tool_name().to_string()
    }

    fn description(&self) -> String {
        self.provider.description()
    }

    fn parameters(&self) -> Value {
        self.provider.parameters()
    }

    async fn call(&self, arguments: Value) -> ToolResult<String> {
        let request = self.provider.resolve(&arguments)?;
        let summary = self.provider.describe(&request);
        info!(target: "speech", tool = self.provider.tool_name(), "Speaking via {}", summary);

        let started = Instant::now();
        let buffer = self.provider.synthesize(&request).await?;
        info!(
            target: "speech",
            tool = self.provider.tool_name(),
            samples = buffer.len(),
            sample_rate = buffer.sample_rate(),
            synth_ms = started.elapsed().as_millis() as u64,
            "Synthesized"
        );

        let cancel = CancelFlag::new();
        let play = self.player.play_with(buffer, cancel.clone());
        tokio::pin!(play);
        let report = match self.playback_limit {
            Some(limit) => tokio::select! {
                report = &mut play => report?,
                _ = tokio::time::sleep(limit) => {
                    warn!(target: "speech", tool = self.provider.tool_name(), ?limit, "Playback limit reached");
                    cancel.cancel();
                    play.await?
                }
            },
            None => play.await?,
        };
        Ok(match report.outcome {
            PlaybackOutcome::Cancelled => "Speech cancelled".to_string(),
            PlaybackOutcome::Completed if self.suppress_output => "Speech completed".to_string(),
            PlaybackOutcome::Completed => self.provider.speaking_text(&request),
        })
    }
}
