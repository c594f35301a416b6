use super::{
    api_error, decode_off_thread, http_client, join_url, optional_str, require_key,
    required_text, SpeechProvider, SpeechRequest,
};
use crate::buffer::SampleBuffer;
use crate::error::ProviderError;
use async_trait::async_trait;
use mcp_tts_core::ToolResult;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_VOICE_ID: &str = "1SM7GgM6IMuvQlz2BwM3";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
const OUTPUT_FORMAT: &str = "mp3_44100_128";

#[derive(Debug, Clone, PartialEq)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub voice_id: String,
    pub model_id: String,
    pub base_url: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElevenLabsRequest {
    pub text: String,
    pub voice_id: String,
    pub model_id: String,
    api_key: String,
}

impl SpeechRequest for ElevenLabsRequest {
    fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Serialize)]
struct Body<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsProvider {
    config: ElevenLabsConfig,
    client: reqwest::Client,
}

impl ElevenLabsProvider {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    type Request = ElevenLabsRequest;

    fn tool_name(&self) -> &'static str {
        "elevenlabs"
    }

    fn description(&self) -> String {
        "Uses the ElevenLabs API to generate speech from text and play it".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to speak" },
                "voice": {
                    "type": "string",
                    "description": format!("ElevenLabs voice ID (default: {})", self.config.voice_id)
                },
                "model": {
                    "type": "string",
                    "description": format!("ElevenLabs model ID (default: {})", self.config.model_id)
                }
            },
            "required": ["text"]
        })
    }

    fn resolve(&self, arguments: &Value) -> ToolResult<ElevenLabsRequest> {
        let text = required_text(arguments)?;
        let api_key = require_key(&self.config.api_key, "ELEVENLABS_API_KEY is not set")?;
        let voice_id = optional_str(arguments, "voice")?.unwrap_or_else(|| self.config.voice_id.clone());
        let model_id = optional_str(arguments, "model")?.unwrap_or_else(|| self.config.model_id.clone());
        Ok(ElevenLabsRequest {
            text,
            voice_id,
            model_id,
            api_key,
        })
    }

    async fn synthesize(&self, request: &ElevenLabsRequest) -> Result<SampleBuffer, ProviderError> {
        let url = join_url(
            &self.config.base_url,
            &format!("/v1/text-to-speech/{}", request.voice_id),
        );
        debug!(target: "provider", provider = "elevenlabs", voice = %request.voice_id, "Requesting speech");

        let response = self
            .client
            .post(url)
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &request.api_key)
            .header("accept", "audio/mpeg")
            .json(&Body {
                text: &request.text,
                model_id: &request.model_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let bytes = response.bytes().await?;
        decode_off_thread(bytes.to_vec(), "mp3").await
    }

    fn describe(&self, request: &ElevenLabsRequest) -> String {
        format!(
            "ElevenLabs with voice {} using model {}",
            request.voice_id, request.model_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_tts_core::ToolError;

    fn provider(api_key: Option<&str>) -> ElevenLabsProvider {
        ElevenLabsProvider::new(ElevenLabsConfig {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let req = provider(Some("k")).resolve(&json!({"text": "hello"})).unwrap();
        assert_eq!(req.voice_id, DEFAULT_VOICE_ID);
        assert_eq!(req.model_id, DEFAULT_MODEL_ID);
        assert_eq!(req.text(), "hello");
    }

    #[test]
    fn test_overrides() {
        let req = provider(Some("k"))
            .resolve(&json!({"text": "hi", "voice": "V9fdGZs6AiHI4uyiAiza", "model": "eleven_turbo_v2"}))
            .unwrap();
        assert_eq!(req.voice_id, "V9fdGZs6AiHI4uyiAiza");
        assert_eq!(
            provider(Some("k")).describe(&req),
            "ElevenLabs with voice V9fdGZs6AiHI4uyiAiza using model eleven_turbo_v2"
        );
    }

    #[test]
    fn test_missing_key() {
        let err = provider(None).resolve(&json!({"text": "hi"})).unwrap_err();
        assert_eq!(
            err,
            ToolError::NotConfigured("ELEVENLABS_API_KEY is not set".to_string())
        );
    }
}
