use super::{
    api_error, decode_off_thread, http_client, join_url, optional_f64, optional_str,
    require_key, required_text, SpeechProvider, SpeechRequest,
};
use crate::buffer::SampleBuffer;
use crate::error::ProviderError;
use async_trait::async_trait;
use mcp_tts_core::{ToolError, ToolResult};
use serde::Serialize;
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_VOICE: &str = "coral";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";
pub const DEFAULT_SPEED: f64 = 1.0;
pub const SPEED_RANGE: RangeInclusive<f64> = 0.25..=4.0;

pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
    "verse",
];

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub voice: String,
    pub model: String,
    /// Default voice instructions when the caller gives none
    pub instructions: Option<String>,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice: DEFAULT_VOICE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            instructions: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
    pub speed: f64,
    pub instructions: Option<String>,
    api_key: String,
}

impl SpeechRequest for OpenAiRequest {
    fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Serialize)]
struct Body<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl SpeechProvider for OpenAiProvider {
    type Request = OpenAiRequest;

    fn tool_name(&self) -> &'static str {
        "openai_tts"
    }

    fn description(&self) -> String {
        "Uses OpenAI's text-to-speech API to generate speech from text and play it".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to speak" },
                "voice": {
                    "type": "string",
                    "description": format!("Voice to use (default: {})", self.config.voice),
                    "enum": VOICES
                },
                "model": {
                    "type": "string",
                    "description": format!("TTS model (default: {})", self.config.model)
                },
                "speed": {
                    "type": "number",
                    "description": "Speech speed (0.25 to 4.0, default: 1.0)",
                    "minimum": SPEED_RANGE.start(),
                    "maximum": SPEED_RANGE.end()
                },
                "instructions": {
                    "type": "string",
                    "description": "Instructions for voice tone and delivery"
                }
            },
            "required": ["text"]
        })
    }

    fn resolve(&self, arguments: &Value) -> ToolResult<OpenAiRequest> {
        let text = required_text(arguments)?;
        let api_key = require_key(&self.config.api_key, "OPENAI_API_KEY is not set")?;
        let voice = optional_str(arguments, "voice")?.unwrap_or_else(|| self.config.voice.clone());
        if !VOICES.contains(&voice.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid voice: {}. Valid voices: {}",
                voice,
                VOICES.join(", ")
            )));
        }
        let model = optional_str(arguments, "model")?.unwrap_or_else(|| self.config.model.clone());
        let speed = optional_f64(arguments, "speed")?.unwrap_or(DEFAULT_SPEED);
        if !SPEED_RANGE.contains(&speed) {
            return Err(ToolError::InvalidArguments(format!(
                "speed must be between {} and {}, got {}",
                SPEED_RANGE.start(),
                SPEED_RANGE.end(),
                speed
            )));
        }
        let instructions = optional_str(arguments, "instructions")?.or_else(|| {
            self.config
                .instructions
                .clone()
                .filter(|i| !i.is_empty())
        });
        Ok(OpenAiRequest {
            text,
            voice,
            model,
            speed,
            instructions,
            api_key,
        })
    }

    async fn synthesize(&self, request: &OpenAiRequest) -> Result<SampleBuffer, ProviderError> {
        let url = join_url(&self.config.base_url, "/v1/audio/speech");
        debug!(
            target: "provider",
            provider = "openai",
            voice = %request.voice,
            model = %request.model,
            speed = request.speed,
            "Requesting speech"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&request.api_key)
            .json(&Body {
                model: &request.model,
                input: &request.text,
                voice: &request.voice,
                speed: request.speed,
                response_format: "mp3",
                instructions: request.instructions.as_deref(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let bytes = response.bytes().await?;
        decode_off_thread(bytes.to_vec(), "mp3").await
    }

    fn describe(&self, request: &OpenAiRequest) -> String {
        format!(
            "OpenAI TTS with voice {}, model {}, speed {:.1}",
            request.voice, request.model, request.speed
        )
    }

    fn speaking_text(&self, request: &OpenAiRequest) -> String {
        let mut out = format!("Speaking: {} (via {})", request.text, self.describe(request));
        if let Some(instructions) = &request.instructions {
            out.push_str(&format!(" with instructions: {}", instructions));
        }
        out
    }
}
