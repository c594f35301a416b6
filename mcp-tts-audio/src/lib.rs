// mcp-tts audio library
// PCM buffers and streams, playback, decoding, and the speech tools built on them

pub mod buffer;
pub mod decode;
pub mod engine;
pub mod error;
pub mod player;
pub mod providers;
pub mod sink;
pub mod stream;
pub mod tools;

pub use buffer::{SampleBuffer, CHANNELS, SAMPLE_WIDTH};
pub use engine::{CancelFlag, PlaybackEngine, PlaybackOutcome, PlaybackReport};
pub use error::{AudioError, ProviderError};
pub use player::Player;
pub use sink::{AudioSink, MemorySink, OutputConfig, OutputKind, SilentSink};
pub use stream::PcmStream;
pub use tools::{register_speech_tools, SayTool, SpeechTool, ToolSet};
