//! Pull-based playback loop.
//!
//! The engine drains a [`PcmStream`] frame by frame into an [`AudioSink`]. It
//! runs on a blocking thread; the async side talks to it only through a
//! [`CancelFlag`].

use crate::error::AudioError;
use crate::sink::AudioSink;
use crate::stream::PcmStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default frame length pulled per iteration
pub const DEFAULT_FRAME_MS: u32 = 50;

/// Shared stop signal between an invocation and its playback thread
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Guard that cancels when dropped, unless disarmed first
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            flag: self.clone(),
            armed: true,
        }
    }
}

/// Cancels playback when the owning future is dropped mid-flight.
#[derive(Debug)]
pub struct CancelOnDrop {
    flag: CancelFlag,
    armed: bool,
}

impl CancelOnDrop {
    /// Playback finished normally; dropping no longer cancels
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub samples_rendered: usize,
    pub outcome: PlaybackOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackEngine {
    frame_ms: u32,
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_MS)
    }
}

impl PlaybackEngine {
    pub fn new(frame_ms: u32) -> Self {
        Self {
            frame_ms: frame_ms.max(1),
        }
    }

    /// Samples per frame at `sample_rate`, never zero
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.frame_ms as u64) / 1000).max(1) as usize
    }

    /// Play `stream` through `sink` until end-of-stream, error or cancellation.
    ///
    /// A render or finish fault is recorded on the stream as its terminal error
    /// and returned. Samples already rendered stay rendered.
    pub fn run(
        &self,
        stream: &mut PcmStream,
        sink: &mut dyn AudioSink,
        cancel: &CancelFlag,
    ) -> Result<PlaybackReport, AudioError> {
        if let Some(e) = stream.err() {
            return Err(e.clone());
        }

        let mut frame = vec![0i16; self.frame_len(stream.sample_rate())];
        let mut rendered = 0usize;

        debug!(
            target: "playback",
            samples = stream.len(),
            sample_rate = stream.sample_rate(),
            frame = frame.len(),
            "Playback started"
        );

        loop {
            if cancel.is_cancelled() {
                sink.abort();
                debug!(target: "playback", rendered, "Playback cancelled");
                return Ok(PlaybackReport {
                    samples_rendered: rendered,
                    outcome: PlaybackOutcome::Cancelled,
                });
            }

            let n = stream.read(&mut frame)?;
            if n == 0 {
                break;
            }

            if let Err(e) = sink.render(&frame[..n]) {
                warn!(target: "playback", error = %e, rendered, "Render failed");
                stream.fail(e.clone());
                sink.abort();
                return Err(e);
            }
            rendered += n;
        }

        if let Err(e) = sink.finish() {
            warn!(target: "playback", error = %e, "Sink failed to drain");
            stream.fail(e.clone());
            return Err(e);
        }

        // The sink may have been interrupted while draining
        let outcome = if cancel.is_cancelled() {
            PlaybackOutcome::Cancelled
        } else {
            PlaybackOutcome::Completed
        };
        debug!(target: "playback", rendered, ?outcome, "Playback finished");

        Ok(PlaybackReport {
            samples_rendered: rendered,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::sink::MemorySink;

    fn stream_of(n: usize, rate: u32) -> PcmStream {
        let samples: Vec<i16> = (0..n).map(|i| i as i16).collect();
        PcmStream::new(Arc::new(SampleBuffer::from_samples(&samples, rate).unwrap()))
    }

    /// Fails on the nth render call
    struct FlakySink {
        calls: usize,
        fail_at: usize,
    }

    impl AudioSink for FlakySink {
        fn render(&mut self, _block: &[i16]) -> Result<(), AudioError> {
            self.calls += 1;
            if self.calls == self.fail_at {
                return Err(AudioError::Playback("device unplugged".into()));
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
    }

    #[test]
    fn test_frame_len() {
        let engine = PlaybackEngine::new(50);
        assert_eq!(engine.frame_len(24_000), 1_200);
        assert_eq!(engine.frame_len(10), 1);
    }

    #[test]
    fn test_renders_whole_stream() {
        let mut stream = stream_of(2_500, 24_000);
        let mut sink = MemorySink::new();
        let report = PlaybackEngine::new(50)
            .run(&mut stream, &mut sink, &CancelFlag::new())
            .unwrap();

        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(report.samples_rendered, 2_500);
        assert_eq!(sink.samples().len(), 2_500);
        assert_eq!(sink.blocks(), 3);
        assert!(sink.finished());
        assert_eq!(stream.position(), stream.len());
    }

    #[test]
    fn test_render_failure_is_terminal() {
        let mut stream = stream_of(5_000, 24_000);
        let mut sink = FlakySink {
            calls: 0,
            fail_at: 2,
        };
        let err = PlaybackEngine::new(50)
            .run(&mut stream, &mut sink, &CancelFlag::new())
            .unwrap_err();

        assert_eq!(err, AudioError::Playback("device unplugged".into()));
        assert_eq!(stream.err(), Some(&err));
        // Second frame was pulled before the render failed
        assert_eq!(stream.position(), 2_400);
        assert_eq!(stream.next_frame(10), Err(err));
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut stream = stream_of(1_000, 8_000);
        let mut sink = MemorySink::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = PlaybackEngine::default()
            .run(&mut stream, &mut sink, &cancel)
            .unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert_eq!(report.samples_rendered, 0);
        assert!(sink.aborted());
    }

    #[test]
    fn test_errored_stream_is_not_played() {
        let mut stream = stream_of(10, 8_000);
        stream.fail(AudioError::Decode("bad".into()));
        let mut sink = MemorySink::new();
        assert!(PlaybackEngine::default()
            .run(&mut stream, &mut sink, &CancelFlag::new())
            .is_err());
        assert!(sink.samples().is_empty());
    }

    #[test]
    fn test_drop_guard() {
        let flag = CancelFlag::new();
        drop(flag.guard());
        assert!(flag.is_cancelled());

        let flag = CancelFlag::new();
        flag.guard().disarm();
        assert!(!flag.is_cancelled());
    }
}
