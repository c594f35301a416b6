//! Async façade over the blocking playback engine.

use crate::buffer::SampleBuffer;
use crate::engine::{CancelFlag, PlaybackEngine, PlaybackReport, DEFAULT_FRAME_MS};
use crate::error::AudioError;
use crate::sink::{AudioSink, OutputConfig};
use crate::stream::PcmStream;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Opens a sink for each utterance
pub trait SinkFactory: Send + Sync {
    fn open(&self, sample_rate: u32, cancel: &CancelFlag) -> Result<Box<dyn AudioSink>, AudioError>;
}

impl SinkFactory for OutputConfig {
    fn open(&self, sample_rate: u32, cancel: &CancelFlag) -> Result<Box<dyn AudioSink>, AudioError> {
        OutputConfig::open(self, sample_rate, cancel)
    }
}

impl<F> SinkFactory for F
where
    F: Fn(u32) -> Box<dyn AudioSink> + Send + Sync,
{
    fn open(&self, sample_rate: u32, _cancel: &CancelFlag) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(self(sample_rate))
    }
}

/// Exclusive right to produce sound, held for the whole utterance
pub type SpeechTurn = OwnedMutexGuard<()>;

/// Plays sample buffers off the async runtime.
///
/// Dropping a `play` future cancels its playback. `play_with` also lets the
/// caller cancel and still collect the report. Unless concurrent speech is
/// allowed, utterances queue behind one gate and never overlap.
#[derive(Clone)]
pub struct Player {
    sinks: Arc<dyn SinkFactory>,
    engine: PlaybackEngine,
    gate: Option<Arc<Mutex<()>>>,
}

impl Player {
    pub fn new(output: OutputConfig) -> Self {
        Self::with_sinks(Arc::new(output))
    }

    pub fn with_sinks(sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            sinks,
            engine: PlaybackEngine::new(DEFAULT_FRAME_MS),
            gate: Some(Arc::new(Mutex::new(()))),
        }
    }

    pub fn with_frame_ms(mut self, frame_ms: u32) -> Self {
        self.engine = PlaybackEngine::new(frame_ms);
        self
    }

    /// Let utterances overlap instead of queueing
    pub fn allow_concurrent(mut self, allow: bool) -> Self {
        self.gate = if allow {
            None
        } else {
            Some(self.gate.unwrap_or_else(|| Arc::new(Mutex::new(()))))
        };
        self
    }

    pub fn is_sequential(&self) -> bool {
        self.gate.is_some()
    }

    /// Wait for our turn to speak. `None` when speech may overlap.
    pub async fn acquire_turn(&self) -> Option<SpeechTurn> {
        match &self.gate {
            Some(gate) => Some(Arc::clone(gate).lock_owned().await),
            None => None,
        }
    }

    /// Play `buffer` to completion or until this future is dropped.
    pub async fn play(&self, buffer: SampleBuffer) -> Result<PlaybackReport, AudioError> {
        self.play_with(buffer, CancelFlag::new()).await
    }

    /// Like [`play`](Self::play), but also stops when `cancel` is set. The
    /// future then resolves to a `Cancelled` report once the sink has stopped.
    pub async fn play_with(
        &self,
        buffer: SampleBuffer,
        cancel: CancelFlag,
    ) -> Result<PlaybackReport, AudioError> {
        let guard = cancel.guard();
        let turn = self.acquire_turn().await;
        let sinks = Arc::clone(&self.sinks);
        let engine = self.engine;

        debug!(
            target: "playback",
            samples = buffer.len(),
            sample_rate = buffer.sample_rate(),
            "Queued utterance"
        );

        let handle = tokio::task::spawn_blocking(move || {
            // Released only once the device has stopped
            let _turn = turn;
            let mut stream = PcmStream::new(Arc::new(buffer));
            let mut sink = sinks.open(stream.sample_rate(), &cancel)?;
            engine.run(&mut stream, sink.as_mut(), &cancel)
        });

        let result = handle
            .await
            .map_err(|e| AudioError::Playback(format!("Playback thread failed: {}", e)))?;
        guard.disarm();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlaybackOutcome;
    use crate::sink::{MemorySink, OutputKind};
    use std::time::Duration;

    fn memory_player(sink: MemorySink) -> Player {
        Player::with_sinks(Arc::new(move |_rate: u32| -> Box<dyn AudioSink> {
            Box::new(sink.clone())
        }))
    }

    #[tokio::test]
    async fn test_play_to_memory() {
        let sink = MemorySink::new();
        let player = memory_player(sink.clone()).with_frame_ms(10);
        let buffer = SampleBuffer::from_samples(&[1, 2, 3, 4, 5], 1_000).unwrap();

        let report = player.play(buffer).await.unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(report.samples_rendered, 5);
        assert_eq!(sink.samples(), vec![1, 2, 3, 4, 5]);
        assert!(sink.finished());
    }

    #[tokio::test]
    async fn test_silent_output() {
        let player = Player::new(OutputConfig {
            kind: OutputKind::Silent,
            ..Default::default()
        });
        let buffer = SampleBuffer::from_samples(&[0; 480], 24_000).unwrap();
        let report = player.play(buffer).await.unwrap();
        assert_eq!(report.samples_rendered, 480);
    }

    #[tokio::test]
    async fn test_gate_serialises_speech() {
        let player = memory_player(MemorySink::new());
        assert!(player.is_sequential());

        let turn = player.acquire_turn().await;
        assert!(turn.is_some());
        let buffer = SampleBuffer::from_samples(&[1, 2], 8_000).unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), player.play(buffer)).await;
        assert!(blocked.is_err(), "second utterance must wait for the first");
        drop(turn);

        let buffer = SampleBuffer::from_samples(&[1, 2], 8_000).unwrap();
        assert!(player.play(buffer).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_while_queued_reports_cancelled() {
        let sink = MemorySink::new();
        let player = memory_player(sink.clone());
        let turn = player.acquire_turn().await;

        let cancel = CancelFlag::new();
        let buffer = SampleBuffer::from_samples(&[1, 2, 3], 8_000).unwrap();
        let pending = tokio::spawn({
            let player = player.clone();
            let cancel = cancel.clone();
            async move { player.play_with(buffer, cancel).await }
        });
        cancel.cancel();
        drop(turn);

        let report = pending.await.unwrap().unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert_eq!(report.samples_rendered, 0);
        assert!(sink.samples().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_mode_has_no_gate() {
        let player = memory_player(MemorySink::new()).allow_concurrent(true);
        assert!(!player.is_sequential());
        assert!(player.acquire_turn().await.is_none());
    }
}
