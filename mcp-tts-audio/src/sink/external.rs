//! Playback through an external command-line player.
//!
//! Samples are buffered, written to a temporary WAV file with `hound` and
//! handed to the first player found on PATH.

use super::AudioSink;
use crate::buffer::CHANNELS;
use crate::engine::CancelFlag;
use crate::error::AudioError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Probe order when no preference is configured
const PLAYERS: &[&str] = &["afplay", "paplay", "aplay", "ffplay"];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Find a player binary: the preference if it resolves, else the first known one.
pub fn resolve_player(preference: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = preference.filter(|p| !p.trim().is_empty()) {
        match which::which(p) {
            Ok(path) => return Some(path),
            Err(_) => warn!(target: "playback", player = %p, "Preferred player not found, probing defaults"),
        }
    }
    PLAYERS.iter().find_map(|name| which::which(name).ok())
}

fn player_command(player: &Path, wav: &Path) -> Command {
    let name = player
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let mut cmd = Command::new(player);
    match name {
        "ffplay" => {
            cmd.args(["-autoexit", "-nodisp", "-loglevel", "quiet"]);
        }
        "aplay" => {
            cmd.arg("-q");
        }
        _ => {}
    }
    cmd.arg(wav)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd
}

pub struct PlayerSink {
    player: PathBuf,
    sample_rate: u32,
    samples: Vec<i16>,
    cancel: CancelFlag,
}

impl PlayerSink {
    pub fn new(player: PathBuf, sample_rate: u32, cancel: CancelFlag) -> Self {
        Self {
            player,
            sample_rate,
            samples: Vec::new(),
            cancel,
        }
    }

    pub fn player(&self) -> &Path {
        &self.player
    }

    fn write_wav(&self, path: &Path) -> Result<(), AudioError> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| AudioError::Playback(format!("Failed to create WAV: {}", e)))?;
        for &s in &self.samples {
            writer
                .write_sample(s)
                .map_err(|e| AudioError::Playback(format!("Failed to write WAV: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::Playback(format!("Failed to finalize WAV: {}", e)))
    }
}

impl AudioSink for PlayerSink {
    fn render(&mut self, block: &[i16]) -> Result<(), AudioError> {
        self.samples.extend_from_slice(block);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        if self.samples.is_empty() || self.cancel.is_cancelled() {
            return Ok(());
        }

        let file = tempfile::Builder::new()
            .prefix("mcp-tts-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| AudioError::Playback(format!("Failed to create temp file: {}", e)))?;
        self.write_wav(file.path())?;

        info!(
            target: "playback",
            player = %self.player.display(),
            samples = self.samples.len(),
            "Playing through external player"
        );
        let mut child = player_command(&self.player, file.path())
            .spawn()
            .map_err(|e| AudioError::Playback(format!("Failed to start {}: {}", self.player.display(), e)))?;

        loop {
            if self.cancel.is_cancelled() {
                debug!(target: "playback", "Stopping external player");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(AudioError::Playback(format!(
                        "{} exited with {}",
                        self.player.display(),
                        status
                    )))
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(AudioError::Playback(e.to_string())),
            }
        }
    }

    fn abort(&mut self) {
        self.samples.clear();
    }
}
