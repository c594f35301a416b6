use mcp_tts_audio::engine::DEFAULT_FRAME_MS;
use mcp_tts_audio::providers::{ElevenLabsConfig, GoogleConfig, OpenAiConfig};
use mcp_tts_audio::{OutputConfig, OutputKind, Player, ToolSet};
use mcp_tts_core::tools::registry::DEFAULT_CALL_TIMEOUT;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the optional TOML overlay
pub const DEFAULT_CONFIG_PATH: &str = "mcp-tts.toml";

/// Server configuration, resolved once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub elevenlabs: ElevenLabsConfig,
    pub google: GoogleConfig,
    pub openai: OpenAiConfig,
    pub output: OutputConfig,
    /// Samples per playback block, in milliseconds of audio
    pub frame_ms: u32,
    /// Let utterances overlap instead of queueing
    pub allow_concurrent: bool,
    /// Answer "Speech completed" instead of echoing the text
    pub suppress_output: bool,
    pub tool_timeout: Duration,
    /// Cut an utterance off after this long and answer "Speech cancelled"
    pub max_playback: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            elevenlabs: ElevenLabsConfig::default(),
            google: GoogleConfig::default(),
            openai: OpenAiConfig::default(),
            output: OutputConfig::default(),
            frame_ms: DEFAULT_FRAME_MS,
            allow_concurrent: false,
            suppress_output: false,
            tool_timeout: DEFAULT_CALL_TIMEOUT,
            max_playback: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with whatever `lookup` knows.
    ///
    /// `lookup` stands in for the process environment; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        cfg.elevenlabs.api_key = get("ELEVENLABS_API_KEY");
        if let Some(v) = get("ELEVENLABS_VOICE_ID") {
            cfg.elevenlabs.voice_id = v;
        }
        if let Some(v) = get("ELEVENLABS_MODEL_ID") {
            cfg.elevenlabs.model_id = v;
        }
        if let Some(v) = get("ELEVENLABS_BASE_URL") {
            cfg.elevenlabs.base_url = v;
        }

        cfg.google.api_key = get("GOOGLE_AI_API_KEY").or_else(|| get("GEMINI_API_KEY"));
        if let Some(v) = get("GOOGLE_AI_BASE_URL") {
            cfg.google.base_url = v;
        }

        cfg.openai.api_key = get("OPENAI_API_KEY");
        cfg.openai.instructions = get("OPENAI_TTS_INSTRUCTIONS");
        if let Some(v) = get("OPENAI_BASE_URL") {
            cfg.openai.base_url = v;
        }

        if let Some(v) = get("MCP_TTS_OUTPUT") {
            match v.parse::<OutputKind>() {
                Ok(kind) => cfg.output.kind = kind,
                Err(e) => {
                    warn!(target: "config", key = "MCP_TTS_OUTPUT", error = %e, "Ignoring invalid value")
                }
            }
        }
        cfg.output.player = get("MCP_TTS_PLAYER");
        cfg.output.device = get("MCP_TTS_DEVICE");

        if let Some(ms) = get("MCP_TTS_FRAME_MS")
            .and_then(|v| positive("MCP_TTS_FRAME_MS", &v))
            .and_then(|ms| u32::try_from(ms).ok())
        {
            cfg.frame_ms = ms;
        }
        if let Some(ms) =
            get("MCP_TTS_TOOL_TIMEOUT_MS").and_then(|v| positive("MCP_TTS_TOOL_TIMEOUT_MS", &v))
        {
            cfg.tool_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) =
            get("MCP_TTS_MAX_PLAYBACK_MS").and_then(|v| positive("MCP_TTS_MAX_PLAYBACK_MS", &v))
        {
            cfg.max_playback = Some(Duration::from_millis(ms));
        }
        if let Some(b) = get("MCP_TTS_ALLOW_CONCURRENT").and_then(|v| parse_flag(&v)) {
            cfg.allow_concurrent = b;
        }
        if let Some(b) = get("MCP_TTS_SUPPRESS_SPEAKING_OUTPUT").and_then(|v| parse_flag(&v)) {
            cfg.suppress_output = b;
        }
        cfg
    }

    /// Load configuration from the process environment plus the TOML file named by
    /// `MCP_TTS_CONFIG` (or ./mcp-tts.toml).
    pub fn load() -> Self {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("MCP_TTS_CONFIG")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_lookup(lookup).overlay_file(Path::new(&path))
    }

    /// Apply the TOML file at `path`. A missing file leaves `self` untouched; so
    /// does one that can't be read or parsed, with a warning.
    pub fn overlay_file(self, path: &Path) -> Self {
        if !path.exists() {
            info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return self;
        }
        match fs::read_to_string(path) {
            Ok(s) => match self.clone().overlay_str(&s) {
                Ok(cfg) => {
                    info!(target: "config", path = %path.display(), "Loaded TOML config");
                    cfg
                }
                Err(e) => {
                    warn!(target: "config", path = %path.display(), error = %e, "Failed to parse TOML; using defaults");
                    self
                }
            },
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "Failed to read TOML; using defaults");
                self
            }
        }
    }

    pub fn overlay_str(self, s: &str) -> Result<Self, toml::de::Error> {
        let overlay: ServerToml = toml::from_str(s)?;
        Ok(overlay.overlay(self))
    }

    /// The shared player every speech tool plays through
    pub fn player(&self) -> Player {
        Player::new(self.output.clone())
            .with_frame_ms(self.frame_ms)
            .allow_concurrent(self.allow_concurrent)
    }

    pub fn tool_set(&self, player: Player) -> ToolSet {
        ToolSet {
            elevenlabs: self.elevenlabs.clone(),
            google: self.google.clone(),
            openai: self.openai.clone(),
            player,
            suppress_output: self.suppress_output,
            playback_limit: self.max_playback,
        }
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(target: "config", value = other, "Ignoring unrecognised boolean");
            None
        }
    }
}

fn positive(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(target: "config", key, value, "Expected a positive integer; keeping default");
            None
        }
    }
}

// =========================
// TOML overlay definitions
// =========================
//
// No API keys here; credentials come from the environment only.

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerToml {
    pub suppress_speaking_output: Option<bool>,
    pub tool_timeout_ms: Option<u64>,
    pub output: Option<OutputToml>,
    pub elevenlabs: Option<ElevenLabsToml>,
    pub google: Option<GoogleToml>,
    pub openai: Option<OpenAiToml>,
}

impl ServerToml {
    fn overlay(self, mut base: ServerConfig) -> ServerConfig {
        if let Some(v) = self.suppress_speaking_output {
            base.suppress_output = v;
        }
        if let Some(ms) = self.tool_timeout_ms.filter(|ms| *ms > 0) {
            base.tool_timeout = Duration::from_millis(ms);
        }
        if let Some(o) = self.output {
            o.apply(&mut base);
        }
        if let Some(e) = self.elevenlabs {
            e.apply(&mut base.elevenlabs);
        }
        if let Some(g) = self.google {
            g.apply(&mut base.google);
        }
        if let Some(o) = self.openai {
            o.apply(&mut base.openai);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputToml {
    pub kind: Option<OutputKind>,
    pub player: Option<String>,
    pub device: Option<String>,
    pub frame_ms: Option<u32>,
    pub allow_concurrent: Option<bool>,
    pub max_playback_ms: Option<u64>,
}
impl OutputToml {
    fn apply(self, c: &mut ServerConfig) {
        if let Some(x) = self.kind {
            c.output.kind = x;
        }
        if let Some(x) = self.player {
            c.output.player = Some(x);
        }
        if let Some(x) = self.device {
            c.output.device = Some(x);
        }
        if let Some(x) = self.frame_ms.filter(|ms| *ms > 0) {
            c.frame_ms = x;
        }
        if let Some(x) = self.allow_concurrent {
            c.allow_concurrent = x;
        }
        if let Some(ms) = self.max_playback_ms.filter(|ms| *ms > 0) {
            c.max_playback = Some(Duration::from_millis(ms));
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ElevenLabsToml {
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub base_url: Option<String>,
}
impl ElevenLabsToml {
    fn apply(self, e: &mut ElevenLabsConfig) {
        if let Some(x) = self.voice_id {
            e.voice_id = x;
        }
        if let Some(x) = self.model_id {
            e.model_id = x;
        }
        if let Some(x) = self.base_url {
            e.base_url = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct GoogleToml {
    pub voice: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}
impl GoogleToml {
    fn apply(self, g: &mut GoogleConfig) {
        if let Some(x) = self.voice {
            g.voice = x;
        }
        if let Some(x) = self.model {
            g.model = x;
        }
        if let Some(x) = self.base_url {
            g.base_url = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenAiToml {
    pub voice: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub base_url: Option<String>,
}
impl OpenAiToml {
    fn apply(self, o: &mut OpenAiConfig) {
        if let Some(x) = self.voice {
            o.voice = x;
        }
        if let Some(x) = self.model {
            o.model = x;
        }
        if let Some(x) = self.instructions {
            o.instructions = Some(x);
        }
        if let Some(x) = self.base_url {
            o.base_url = x;
        }
    }
}
