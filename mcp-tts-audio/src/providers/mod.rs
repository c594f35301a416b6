//! Remote text-to-speech providers.
//!
//! Every provider turns loosely typed tool arguments into a typed request once,
//! at the boundary, and then into a [`SampleBuffer`].

pub mod elevenlabs;
pub mod google;
pub mod openai;

pub use elevenlabs::{ElevenLabsConfig, ElevenLabsProvider};
pub use google::{GoogleConfig, GoogleProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};

use crate::buffer::SampleBuffer;
use crate::decode::decode_compressed;
use crate::error::{AudioError, ProviderError};
use async_trait::async_trait;
use mcp_tts_core::{ToolError, ToolResult};
use serde_json::Value;
use std::time::Duration;

/// Upper bound for one synthesis round trip
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A validated request that carries the text to speak
pub trait SpeechRequest: Send + Sync {
    fn text(&self) -> &str;
}

#[async_trait]
pub trait SpeechProvider: Send + Sync + 'static {
    type Request: SpeechRequest;

    /// Tool name the provider is exposed under
    fn tool_name(&self) -> &'static str;

    fn description(&self) -> String;

    /// JSON schema of the tool arguments
    fn parameters(&self) -> Value;

    /// Validate arguments, fill defaults and check credentials
    fn resolve(&self, arguments: &Value) -> ToolResult<Self::Request>;

    async fn synthesize(&self, request: &Self::Request) -> Result<SampleBuffer, ProviderError>;

    /// Human-readable summary, e.g. "Google TTS with voice Kore using model ..."
    fn describe(&self, request: &Self::Request) -> String;

    /// Result text once the request has been spoken
    fn speaking_text(&self, request: &Self::Request) -> String {
        format!("Speaking: {} (via {})", request.text(), self.describe(request))
    }
}

/// The `text` argument: a non-empty string
pub fn required_text(arguments: &Value) -> ToolResult<String> {
    let text = arguments
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("text must be a string".to_string()))?;
    if text.is_empty() {
        return Err(ToolError::InvalidArguments("Empty text provided".to_string()));
    }
    Ok(text.to_string())
}

/// An optional string argument; empty means unset
pub fn optional_str(arguments: &Value, key: &str) -> ToolResult<Option<String>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ToolError::InvalidArguments(format!("{} must be a string", key))),
    }
}

/// An optional numeric argument
pub fn optional_f64(arguments: &Value, key: &str) -> ToolResult<Option<f64>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments(format!("{} must be a number", key))),
    }
}

/// Credential check done at resolve time
pub(crate) fn require_key(key: &Option<String>, message: &str) -> ToolResult<String> {
    key.as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolError::NotConfigured(message.to_string()))
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Strip a trailing slash so paths can be appended
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Turn a non-2xx response into `ProviderError::Api`, keeping the vendor's message.
pub(crate) async fn api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Api {
        status,
        message: vendor_message(&body),
    }
}

fn vendor_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.pointer("/detail/message"))
            .or_else(|| v.get("detail").filter(|d| d.is_string()))
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match message {
        Some(m) => m,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.chars().take(500).collect(),
    }
}

/// Decode compressed audio on the blocking pool
pub(crate) async fn decode_off_thread(
    bytes: Vec<u8>,
    extension: &'static str,
) -> Result<SampleBuffer, ProviderError> {
    let buffer = tokio::task::spawn_blocking(move || decode_compressed(&bytes, Some(extension)))
        .await
        .map_err(|e| AudioError::Decode(format!("decoder task failed: {}", e)))??;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(&json!({"text": "hi"})).unwrap(), "hi");
        assert_eq!(
            required_text(&json!({"text": 5})).unwrap_err().to_string(),
            "text must be a string"
        );
        assert_eq!(
            required_text(&json!({})).unwrap_err().to_string(),
            "text must be a string"
        );
        assert_eq!(
            required_text(&json!({"text": ""})).unwrap_err().to_string(),
            "Empty text provided"
        );
    }

    #[test]
    fn test_optional_arguments() {
        let args = json!({"voice": "", "model": "m1", "speed": 1.5, "bad": 3});
        assert_eq!(optional_str(&args, "voice").unwrap(), None);
        assert_eq!(optional_str(&args, "model").unwrap(), Some("m1".to_string()));
        assert_eq!(optional_str(&args, "missing").unwrap(), None);
        assert!(optional_str(&args, "bad").is_err());
        assert_eq!(optional_f64(&args, "speed").unwrap(), Some(1.5));
        assert!(optional_f64(&args, "model").is_err());
    }

    #[test]
    fn test_vendor_message_shapes() {
        assert_eq!(vendor_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(
            vendor_message(r#"{"detail":{"status":"quota","message":"out of credits"}}"#),
            "out of credits"
        );
        assert_eq!(vendor_message(r#"{"detail":"Not Found"}"#), "Not Found");
        assert_eq!(vendor_message("upstream exploded"), "upstream exploded");
        assert_eq!(vendor_message(""), "empty response body");
    }

    #[test]
    fn test_require_key() {
        assert_eq!(
            require_key(&None, "OPENAI_API_KEY is not set").unwrap_err(),
            ToolError::NotConfigured("OPENAI_API_KEY is not set".to_string())
        );
        assert!(require_key(&Some("  ".into()), "x").is_err());
        assert_eq!(require_key(&Some("k".into()), "x").unwrap(), "k");
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/", "/v1/x"), "http://h/v1/x");
        assert_eq!(join_url("http://h", "/v1/x"), "http://h/v1/x");
    }
}
