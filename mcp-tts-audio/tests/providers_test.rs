/// Provider adapters against a mock HTTP server
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mcp_tts_audio::providers::{
    ElevenLabsConfig, ElevenLabsProvider, GoogleConfig, GoogleProvider, OpenAiConfig,
    OpenAiProvider, SpeechProvider,
};
use mcp_tts_audio::{AudioError, AudioSink, MemorySink, Player, ProviderError, SpeechTool};
use mcp_tts_core::{Tool, ToolError};
use mockito::Matcher;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn pcm_base64(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    BASE64.encode(bytes)
}

fn memory_player(sink: &MemorySink) -> Player {
    let sink = sink.clone();
    Player::with_sinks(Arc::new(move |_rate: u32| -> Box<dyn AudioSink> {
        Box::new(sink.clone())
    }))
}

#[tokio::test]
async fn openai_posts_speech_request_and_decodes_audio() {
    let mut server = mockito::Server::new_async().await;
    let samples: Vec<i16> = (0..2_400).map(|i| (i % 50) as i16).collect();
    let mock = server
        .mock("POST", "/v1/audio/speech")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini-tts",
            "input": "Hello",
            "voice": "nova",
            "speed": 1.5,
            "response_format": "mp3"
        })))
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(wav_bytes(&samples, 24_000))
        .create_async()
        .await;

    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: Some("sk-test".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider
        .resolve(&json!({"text": "Hello", "voice": "nova", "speed": 1.5}))
        .unwrap();
    let buffer = provider.synthesize(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(buffer.sample_rate(), 24_000);
    assert_eq!(buffer.len(), samples.len());
    assert_eq!(buffer.sample_at(49).unwrap(), 49);
}

#[tokio::test]
async fn openai_error_message_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/audio/speech")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#)
        .create_async()
        .await;

    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: Some("sk-bad".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider.resolve(&json!({"text": "Hello"})).unwrap();
    let err = provider.synthesize(&request).await.unwrap_err();

    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn elevenlabs_uses_voice_path_and_key_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Regex(r"^/v1/text-to-speech/voice123".to_string()))
        .match_query(Matcher::UrlEncoded(
            "output_format".to_string(),
            "mp3_44100_128".to_string(),
        ))
        .match_header("xi-api-key", "el-key")
        .match_body(Matcher::PartialJson(json!({
            "text": "Hi there",
            "model_id": "eleven_multilingual_v2"
        })))
        .with_status(200)
        .with_body(wav_bytes(&[100, 200, 300], 44_100))
        .create_async()
        .await;

    let provider = ElevenLabsProvider::new(ElevenLabsConfig {
        api_key: Some("el-key".to_string()),
        voice_id: "voice123".to_string(),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider.resolve(&json!({"text": "Hi there"})).unwrap();
    let buffer = provider.synthesize(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(buffer.sample_rate(), 44_100);
    assert_eq!(buffer.len(), 3);
}

#[tokio::test]
async fn undecodable_audio_is_a_decode_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", Matcher::Regex(r"^/v1/text-to-speech/".to_string()))
        .with_status(200)
        .with_body("this is not audio")
        .create_async()
        .await;

    let provider = ElevenLabsProvider::new(ElevenLabsConfig {
        api_key: Some("el-key".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider.resolve(&json!({"text": "Hi"})).unwrap();
    let err = provider.synthesize(&request).await.unwrap_err();
    assert!(matches!(err, ProviderError::Audio(AudioError::Decode(_))));
}

#[tokio::test]
async fn google_reads_inline_pcm_at_mime_rate() {
    let mut server = mockito::Server::new_async().await;
    let samples = [0i16, 32767, -32768, 1];
    let mock = server
        .mock(
            "POST",
            "/v1beta/models/gemini-2.5-flash-preview-tts:generateContent",
        )
        .match_header("x-goog-api-key", "g-key")
        .match_body(Matcher::PartialJson(json!({
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Puck" } }
                }
            }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "candidates": [{
                    "content": {
                        "parts": [{
                            "inlineData": {
                                "mimeType": "audio/L16;codec=pcm;rate=16000",
                                "data": pcm_base64(&samples)
                            }
                        }]
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = GoogleProvider::new(GoogleConfig {
        api_key: Some("g-key".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider.resolve(&json!({"text": "Hi", "voice": "Puck"})).unwrap();
    let buffer = provider.synthesize(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(buffer.sample_rate(), 16_000);
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.sample_at(2).unwrap(), -32768);
}

#[tokio::test]
async fn google_without_audio_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", Matcher::Any)
        .with_status(200)
        .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"no audio"}]}}]}"#)
        .create_async()
        .await;

    let provider = GoogleProvider::new(GoogleConfig {
        api_key: Some("g-key".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let request = provider.resolve(&json!({"text": "Hi"})).unwrap();
    let err = provider.synthesize(&request).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn speech_tool_synthesizes_then_plays() {
    let mut server = mockito::Server::new_async().await;
    let samples: Vec<i16> = (0..480).map(|i| i as i16).collect();
    let _mock = server
        .mock("POST", Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "candidates": [{ "content": { "parts": [{ "inlineData": {
                    "mimeType": "audio/L16;codec=pcm;rate=24000",
                    "data": pcm_base64(&samples)
                }}]}}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let sink = MemorySink::new();
    let provider = GoogleProvider::new(GoogleConfig {
        api_key: Some("g-key".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let tool = SpeechTool::new(provider, memory_player(&sink));

    let text = tool.call(json!({"text": "Hello, world!"})).await.unwrap();
    assert_eq!(
        text,
        "Speaking: Hello, world! (via Google TTS with voice Kore using model gemini-2.5-flash-preview-tts)"
    );
    assert_eq!(sink.samples(), samples);
    assert!(sink.finished());
}

/// Takes `per_block` to play each block
struct SlowSink {
    inner: MemorySink,
    per_block: Duration,
}

impl AudioSink for SlowSink {
    fn render(&mut self, block: &[i16]) -> Result<(), AudioError> {
        std::thread::sleep(self.per_block);
        self.inner.render(block)
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.inner.finish()
    }

    fn abort(&mut self) {
        self.inner.abort()
    }
}

#[tokio::test]
async fn speech_tool_reports_cancelled_playback() {
    let mut server = mockito::Server::new_async().await;
    // Two seconds of audio, 40 blocks at 30 ms each
    let samples = vec![7i16; 48_000];
    let _mock = server
        .mock("POST", Matcher::Any)
        .with_status(200)
        .with_body(
            json!({
                "candidates": [{ "content": { "parts": [{ "inlineData": {
                    "mimeType": "audio/L16;codec=pcm;rate=24000",
                    "data": pcm_base64(&samples)
                }}]}}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let sink = MemorySink::new();
    let handle = sink.clone();
    let player = Player::with_sinks(Arc::new(move |_rate: u32| -> Box<dyn AudioSink> {
        Box::new(SlowSink {
            inner: handle.clone(),
            per_block: Duration::from_millis(30),
        })
    }));
    let provider = GoogleProvider::new(GoogleConfig {
        api_key: Some("g-key".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let tool = SpeechTool::new(provider, player.clone())
        .playback_limit(Some(Duration::from_millis(150)));

    let text = tool.call(json!({"text": "A long story"})).await.unwrap();
    assert_eq!(text, "Speech cancelled");
    assert!(sink.aborted());
    assert!(!sink.finished());
    assert!(sink.samples().len() < samples.len());

    // The gate is already free for the next utterance
    assert!(player.acquire_turn().await.is_some());
}

#[tokio::test]
async fn speech_tool_reports_suppressed_output_and_failures() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", Matcher::Any)
        .with_status(500)
        .with_body(r#"{"error":{"message":"backend unavailable"}}"#)
        .create_async()
        .await;

    let sink = MemorySink::new();
    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: Some("sk-test".to_string()),
        base_url: server.url(),
        ..Default::default()
    })
    .unwrap();
    let tool = SpeechTool::new(provider, memory_player(&sink)).suppress_output(true);

    let err = tool.call(json!({"text": "Hello"})).await.unwrap_err();
    assert_eq!(
        err,
        ToolError::ExecutionFailed("API error (500): backend unavailable".to_string())
    );
    assert!(sink.samples().is_empty());

    // Validation errors never reach the network
    let err = tool.call(json!({"text": 42})).await.unwrap_err();
    assert_eq!(err.to_string(), "text must be a string");
}
