use mcp_tts_core::ToolError;
use thiserror::Error;

/// Faults raised while building, reading or rendering audio
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Byte count not aligned to the sample width, or a zero sample rate
    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    /// Sample index past the end of the buffer
    #[error("Sample index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },

    /// Seek target outside `[0, len]`; the stream position is unchanged
    #[error("Seek target {target} out of range [0, {len}]")]
    SeekOutOfRange { target: i64, len: usize },

    /// Provider payload could not be turned into 16-bit mono PCM
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output device or external player failure
    #[error("Playback error: {0}")]
    Playback(String),
}

impl AudioError {
    pub fn code(&self) -> &'static str {
        match self {
            AudioError::MalformedAudio(_) => "MALFORMED_AUDIO",
            AudioError::OutOfRange { .. } => "OUT_OF_RANGE",
            AudioError::SeekOutOfRange { .. } => "SEEK_OUT_OF_RANGE",
            AudioError::Decode(_) => "DECODE_ERROR",
            AudioError::Playback(_) => "PLAYBACK_ERROR",
        }
    }
}

/// Failures talking to a remote speech provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl From<ProviderError> for ToolError {
    fn from(err: ProviderError) -> Self {
        ToolError::ExecutionFailed(err.to_string())
    }
}

impl From<AudioError> for ToolError {
    fn from(err: AudioError) -> Self {
        ToolError::ExecutionFailed(err.to_string())
    }
}
