use super::{
    api_error, http_client, join_url, optional_str, require_key, required_text, SpeechProvider,
    SpeechRequest,
};
use crate::buffer::SampleBuffer;
use crate::decode::{decode_base64_pcm, sample_rate_from_mime};
use crate::error::ProviderError;
use async_trait::async_trait;
use mcp_tts_core::{ToolError, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-tts";
/// Gemini returns L16 PCM at this rate unless the mime type says otherwise
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Prebuilt Gemini voices
pub const VOICES: &[&str] = &[
    "Zephyr", "Puck", "Charon", "Kore", "Fenrir", "Aoede", "Leda", "Orus",
    "Autonoe", "Enceladus", "Callirhoe", "Iapetus", "Umbriel", "Algieba",
    "Despina", "Erinome", "Algenib", "Rasalgethi", "Laomedeia", "Achernar",
    "Alnilam", "Schedar", "Gacrux", "Pulcherrima", "Achird", "Zubenelgenubi",
    "Vindemiatrix", "Sadachbia", "Sadaltager", "Sulafar",
];

#[derive(Debug, Clone, PartialEq)]
pub struct GoogleConfig {
    pub api_key: Option<String>,
    pub voice: String,
    pub model: String,
    pub base_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice: DEFAULT_VOICE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoogleRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
    api_key: String,
}

impl SpeechRequest for GoogleRequest {
    fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

pub struct GoogleProvider {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    fn body(request: &GoogleRequest) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": request.text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": request.voice }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SpeechProvider for GoogleProvider {
    type Request = GoogleRequest;

    fn tool_name(&self) -> &'static str {
        "google_tts"
    }

    fn description(&self) -> String {
        "Uses Google's Gemini TTS to generate speech from text and play it".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to speak" },
                "voice": {
                    "type": "string",
                    "description": format!("Prebuilt voice name (default: {})", self.config.voice),
                    "enum": VOICES
                },
                "model": {
                    "type": "string",
                    "description": format!("Gemini TTS model (default: {})", self.config.model)
                }
            },
            "required": ["text"]
        })
    }

    fn resolve(&self, arguments: &Value) -> ToolResult<GoogleRequest> {
        let text = required_text(arguments)?;
        let api_key = require_key(
            &self.config.api_key,
            "GOOGLE_AI_API_KEY or GEMINI_API_KEY is not set",
        )?;
        let voice = optional_str(arguments, "voice")?.unwrap_or_else(|| self.config.voice.clone());
        if !VOICES.contains(&voice.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid voice: {}. Valid voices: {}",
                voice,
                VOICES.join(", ")
            )));
        }
        let model = optional_str(arguments, "model")?.unwrap_or_else(|| self.config.model.clone());
        Ok(GoogleRequest {
            text,
            voice,
            model,
            api_key,
        })
    }

    async fn synthesize(&self, request: &GoogleRequest) -> Result<SampleBuffer, ProviderError> {
        let url = join_url(
            &self.config.base_url,
            &format!("/v1beta/models/{}:generateContent", request.model),
        );
        debug!(target: "provider", provider = "google", voice = %request.voice, model = %request.model, "Requesting speech");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &request.api_key)
            .json(&Self::body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let parsed: GenerateContentResponse = response.json().await?;

        let inline = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data))
            .ok_or_else(|| ProviderError::InvalidResponse("no audio data in response".to_string()))?;

        let rate = sample_rate_from_mime(&inline.mime_type).unwrap_or(DEFAULT_SAMPLE_RATE);
        debug!(target: "provider", mime = %inline.mime_type, sample_rate = rate, "Received PCM");
        Ok(decode_base64_pcm(&inline.data, rate)?)
    }

    fn describe(&self, request: &GoogleRequest) -> String {
        format!(
            "Google TTS with voice {} using model {}",
            request.voice, request.model
        )
    }
}
