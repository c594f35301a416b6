//! Audio sinks: where the playback engine sends rendered frames.

mod external;

#[cfg(feature = "device")]
mod device;

#[cfg(feature = "device")]
pub use device::DeviceSink;
pub use external::{resolve_player, PlayerSink};

use crate::engine::CancelFlag;
use crate::error::AudioError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Consumer side of the playback engine
pub trait AudioSink {
    /// Render one block of mono samples. May block for pacing.
    fn render(&mut self, block: &[i16]) -> Result<(), AudioError>;

    /// Flush and wait until everything rendered has been heard
    fn finish(&mut self) -> Result<(), AudioError>;

    /// Stop immediately and drop anything queued
    fn abort(&mut self) {}
}

/// Where audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// System output device through cpal
    Device,
    /// WAV file handed to an external player
    #[default]
    Player,
    /// Discard; for headless hosts
    Silent,
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" => Ok(OutputKind::Device),
            "player" => Ok(OutputKind::Player),
            "silent" | "none" => Ok(OutputKind::Silent),
            other => Err(format!("unknown output kind: {}", other)),
        }
    }
}

/// How to open a sink for one utterance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub kind: OutputKind,
    /// Preferred external player (name on PATH or absolute path)
    pub player: Option<String>,
    /// Output device name; default device when unset or not found
    pub device: Option<String>,
}

impl OutputConfig {
    /// Open a sink for audio at `sample_rate`.
    ///
    /// The flag lets sinks that block while draining stop early.
    pub fn open(
        &self,
        sample_rate: u32,
        cancel: &CancelFlag,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        debug!(target: "playback", kind = ?self.kind, sample_rate, "Opening sink");
        match self.kind {
            OutputKind::Silent => Ok(Box::new(SilentSink)),
            OutputKind::Player => {
                let player = resolve_player(self.player.as_deref()).ok_or_else(|| {
                    AudioError::Playback(
                        "no audio player found (tried afplay, paplay, aplay, ffplay)".to_string(),
                    )
                })?;
                Ok(Box::new(PlayerSink::new(player, sample_rate, cancel.clone())))
            }
            #[cfg(feature = "device")]
            OutputKind::Device => Ok(Box::new(DeviceSink::open(
                self.device.as_deref(),
                sample_rate,
                cancel.clone(),
            )?)),
            #[cfg(not(feature = "device"))]
            OutputKind::Device => Err(AudioError::Playback(
                "device output not compiled in; rebuild with the `device` feature".to_string(),
            )),
        }
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn render(&mut self, _block: &[i16]) -> Result<(), AudioError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    samples: Vec<i16>,
    blocks: usize,
    finished: bool,
    aborted: bool,
}

/// Collects rendered samples. Clones share the same storage.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn samples(&self) -> Vec<i16> {
        self.state().samples.clone()
    }

    /// Number of render calls
    pub fn blocks(&self) -> usize {
        self.state().blocks
    }

    pub fn finished(&self) -> bool {
        self.state().finished
    }

    pub fn aborted(&self) -> bool {
        self.state().aborted
    }
}

impl AudioSink for MemorySink {
    fn render(&mut self, block: &[i16]) -> Result<(), AudioError> {
        let mut state = self.state();
        state.samples.extend_from_slice(block);
        state.blocks += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        self.state().finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.state().aborted = true;
    }
}
