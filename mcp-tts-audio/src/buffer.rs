//! Immutable 16-bit little-endian mono sample buffer.

use crate::error::AudioError;
use std::fmt;
use std::time::Duration;

/// Bytes per sample
pub const SAMPLE_WIDTH: usize = 2;

/// Channel count; every provider output is normalised to mono
pub const CHANNELS: u16 = 1;

/// Decoded provider audio at a known sample rate.
///
/// Read-only after construction, so any number of readers may share it.
#[derive(Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    bytes: Vec<u8>,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Wrap raw 16-bit LE PCM bytes.
    ///
    /// Fails with `MalformedAudio` when the byte count is odd or the rate is zero.
    pub fn new(bytes: Vec<u8>, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::MalformedAudio(
                "sample rate must be positive".to_string(),
            ));
        }
        if bytes.len() % SAMPLE_WIDTH != 0 {
            return Err(AudioError::MalformedAudio(format!(
                "{} bytes is not a multiple of the {}-byte sample width",
                bytes.len(),
                SAMPLE_WIDTH
            )));
        }
        Ok(Self { bytes, sample_rate })
    }

    /// Encode samples into a new buffer.
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Result<Self, AudioError> {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(bytes, sample_rate)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.bytes.len() / SAMPLE_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playing time at the buffer's sample rate
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sample at `index`, decoded from bytes `[2*index, 2*index+1]`.
    pub fn sample_at(&self, index: usize) -> Result<i16, AudioError> {
        if index >= self.len() {
            return Err(AudioError::OutOfRange {
                index,
                len: self.len(),
            });
        }
        let offset = index * SAMPLE_WIDTH;
        Ok(i16::from_le_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
        ]))
    }

    /// Decode `out.len()` samples starting at `start` in one pass.
    pub(crate) fn copy_samples(&self, start: usize, out: &mut [i16]) -> Result<(), AudioError> {
        let end = start + out.len();
        if end > self.len() {
            return Err(AudioError::OutOfRange {
                index: end.saturating_sub(1),
                len: self.len(),
            });
        }
        let bytes = &self.bytes[start * SAMPLE_WIDTH..end * SAMPLE_WIDTH];
        for (dst, pair) in out.iter_mut().zip(bytes.chunks_exact(SAMPLE_WIDTH)) {
            *dst = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(())
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("samples", &self.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
