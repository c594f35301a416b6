//! Seekable cursor over a [`SampleBuffer`].
//!
//! The stream is the only stateful piece of the audio path. It is driven by
//! one consumer at a time (`&mut self`), so reads and seeks are linearised by
//! the borrow checker rather than by a lock.

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use std::sync::Arc;

#[derive(Debug)]
pub struct PcmStream {
    buffer: Arc<SampleBuffer>,
    /// Cached at construction; never recomputed
    len: usize,
    position: usize,
    error: Option<AudioError>,
}

impl PcmStream {
    pub fn new(buffer: Arc<SampleBuffer>) -> Self {
        let len = buffer.len();
        Self {
            buffer,
            len,
            position: 0,
            error: None,
        }
    }

    /// Total samples in the underlying buffer
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read cursor, in samples
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.len - self.position
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// The terminal error, if one was recorded
    pub fn err(&self) -> Option<&AudioError> {
        self.error.as_ref()
    }

    /// Move the cursor to `target`. Seeking to `len()` is legal and means "at end".
    pub fn seek(&mut self, target: usize) -> Result<(), AudioError> {
        self.check_healthy()?;
        if target > self.len {
            return Err(AudioError::SeekOutOfRange {
                target: i64::try_from(target).unwrap_or(i64::MAX),
                len: self.len,
            });
        }
        self.position = target;
        Ok(())
    }

    /// Move the cursor by `delta` samples (negative rewinds).
    pub fn seek_by(&mut self, delta: i64) -> Result<(), AudioError> {
        self.check_healthy()?;
        let target = (self.position as i64).saturating_add(delta);
        if target < 0 || target as u64 > self.len as u64 {
            return Err(AudioError::SeekOutOfRange {
                target,
                len: self.len,
            });
        }
        self.position = target as usize;
        Ok(())
    }

    /// Up to `count` samples from the cursor.
    ///
    /// An empty `Ok` is end-of-stream. Once the stream has failed, every call
    /// returns the terminal error and the position stays put.
    pub fn next_frame(&mut self, count: usize) -> Result<Vec<i16>, AudioError> {
        self.check_healthy()?;
        let n = count.min(self.remaining());
        let mut frame = vec![0i16; n];
        self.fill(&mut frame)?;
        Ok(frame)
    }

    /// Allocation-free variant of [`next_frame`](Self::next_frame); returns the
    /// number of samples written to the front of `out`.
    pub fn read(&mut self, out: &mut [i16]) -> Result<usize, AudioError> {
        self.check_healthy()?;
        let n = out.len().min(self.remaining());
        self.fill(&mut out[..n])?;
        Ok(n)
    }

    /// Record a terminal fault. The first error wins.
    pub fn fail(&mut self, error: AudioError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn fill(&mut self, out: &mut [i16]) -> Result<(), AudioError> {
        if out.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.buffer.copy_samples(self.position, out) {
            // Cannot happen while `len` matches the buffer; keep it visible if it does
            self.fail(e.clone());
            return Err(e);
        }
        self.position += out.len();
        Ok(())
    }

    fn check_healthy(&self) -> Result<(), AudioError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
