//! `say`: the local macOS speech synthesizer.

use crate::player::Player;
use crate::providers::{optional_str, required_text};
use async_trait::async_trait;
use mcp_tts_core::{Tool, ToolError, ToolResult};
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Words per minute accepted by `say -r`
pub const RATE_RANGE: RangeInclusive<u64> = 1..=1000;

pub struct SayTool {
    binary: PathBuf,
    player: Player,
    suppress_output: bool,
    playback_limit: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
struct SayRequest {
    text: String,
    voice: Option<String>,
    rate: Option<u64>,
}

impl SayTool {
    /// `player` supplies the speech gate shared with the other tools
    pub fn new(player: Player) -> Self {
        Self {
            binary: PathBuf::from("say"),
            player,
            suppress_output: false,
            playback_limit: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn suppress_output(mut self, suppress: bool) -> Self {
        self.suppress_output = suppress;
        self
    }

    /// Kill `say` after `limit` and answer "Speech cancelled"
    pub fn playback_limit(mut self, limit: Option<Duration>) -> Self {
        self.playback_limit = limit;
        self
    }

    fn resolve(arguments: &Value) -> ToolResult<SayRequest> {
        let text = required_text(arguments)?;
        let voice = optional_str(arguments, "voice")?;
        let rate = match arguments.get("rate") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .filter(|r| RATE_RANGE.contains(r))
                    .ok_or_else(|| {
                        ToolError::InvalidArguments(
                            "rate must be an integer between 1 and 1000".to_string(),
                        )
                    })?,
            ),
        };
        Ok(SayRequest { text, voice, rate })
    }

    fn command(&self, request: &SayRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(voice) = &request.voice {
            cmd.arg("-v").arg(voice);
        }
        if let Some(rate) = request.rate {
            cmd.arg("-r").arg(rate.to_string());
        }
        // Text goes through stdin so it is never parsed as a flag
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Tool for SayTool {
    fn name(&self) -> String {
        "say".to_string()
    }

    fn description(&self) -> String {
        "Speaks the provided text out loud using the macOS text-to-speech engine".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to speak" },
                "voice": { "type": "string", "description": "System voice name (e.g. Alex, Samantha)" },
                "rate": {
                    "type": "integer",
                    "description": "Speaking rate in words per minute",
                    "minimum": RATE_RANGE.start(),
                    "maximum": RATE_RANGE.end()
                }
            },
            "required": ["text"]
        })
    }

    async fn call(&self, arguments: Value) -> ToolResult<String> {
        let request = Self::resolve(&arguments)?;
        let _turn = self.player.acquire_turn().await;

        info!(target: "speech", tool = "say", voice = ?request.voice, rate = ?request.rate, "Speaking");
        let mut child = self.command(&request).spawn().map_err(|e| {
            ToolError::ExecutionFailed(format!("Failed to run {}: {}", self.binary.display(), e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.text.as_bytes())
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("Failed to write to say: {}", e)))?;
        }

        // kill_on_drop stops `say` if the wait is abandoned
        let wait = child.wait_with_output();
        let output = match self.playback_limit {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(target: "speech", tool = "say", ?limit, "Playback limit reached");
                    return Ok("Speech cancelled".to_string());
                }
            },
            None => wait.await,
        }
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to wait for say: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::ExecutionFailed(format!(
                "say exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!(target: "speech", tool = "say", "Finished");

        if self.suppress_output {
            Ok("Speech completed".to_string())
        } else {
            Ok(format!("Speaking: {}", request.text))
        }
    }
}
