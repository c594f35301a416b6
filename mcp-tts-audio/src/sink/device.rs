//! System audio output through cpal.
//!
//! The engine thread pushes converted blocks into a small bounded channel; the
//! cpal callback drains it. A full channel blocks `render`, which paces the
//! engine to the device clock. The wait wakes every `POLL_INTERVAL` so a stalled
//! device or a cancel still gets through.

use super::AudioSink;
use crate::engine::CancelFlag;
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel::{bounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Blocks queued ahead of the device
const QUEUE_BLOCKS: usize = 4;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct DeviceSink {
    stream: Stream,
    tx: Option<Sender<Vec<f32>>>,
    resampler: LinearResampler,
    /// Set by the callback once the channel is closed and empty
    drained: Arc<AtomicBool>,
    /// Set by the cpal error callback
    error_flag: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl DeviceSink {
    /// Open `device_name` (default device when unset or missing) for mono audio at `sample_rate`.
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        cancel: CancelFlag,
    ) -> Result<Self, AudioError> {
        let device = pick_device(device_name)?;
        let (config, sample_format) = pick_config(&device, sample_rate)?;
        debug!(
            target: "playback",
            device_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "Device config"
        );

        let (tx, rx) = bounded::<Vec<f32>>(QUEUE_BLOCKS);
        let drained = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, rx, &drained, &error_flag),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, rx, &drained, &error_flag),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, rx, &drained, &error_flag),
            other => Err(AudioError::Playback(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        }?;
        stream
            .play()
            .map_err(|e| AudioError::Playback(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            stream,
            tx: Some(tx),
            resampler: LinearResampler::new(sample_rate, config.sample_rate.0),
            drained,
            error_flag,
            cancel,
        })
    }

    fn check_device(&self) -> Result<(), AudioError> {
        check_device(&self.error_flag)
    }
}

fn check_device(error_flag: &AtomicBool) -> Result<(), AudioError> {
    if error_flag.load(Ordering::SeqCst) {
        return Err(AudioError::Playback("audio device reported an error".to_string()));
    }
    Ok(())
}

/// Queue `block` for the device. Returns `Ok(false)` if cancelled before the
/// queue had room; the block is then dropped.
fn send_block(
    tx: &Sender<Vec<f32>>,
    mut block: Vec<f32>,
    error_flag: &AtomicBool,
    cancel: &CancelFlag,
) -> Result<bool, AudioError> {
    loop {
        match tx.send_timeout(block, POLL_INTERVAL) {
            Ok(()) => return Ok(true),
            Err(SendTimeoutError::Timeout(back)) => {
                check_device(error_flag)?;
                if cancel.is_cancelled() {
                    return Ok(false);
                }
                block = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(AudioError::Playback("audio stream closed".to_string()))
            }
        }
    }
}

impl AudioSink for DeviceSink {
    fn render(&mut self, block: &[i16]) -> Result<(), AudioError> {
        self.check_device()?;
        let input: Vec<f32> = block.iter().map(|&s| f32::from_sample(s)).collect();
        let mut out = Vec::with_capacity(input.len() * 2);
        self.resampler.process(&input, &mut out);

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| AudioError::Playback("sink already finished".to_string()))?;
        if !send_block(tx, out, &self.error_flag, &self.cancel)? {
            debug!(target: "playback", "Cancelled while waiting for the device");
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        // Closing the channel lets the callback report when it has run dry
        self.tx.take();
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while !self.drained.load(Ordering::SeqCst) {
            self.check_device()?;
            if self.cancel.is_cancelled() {
                self.abort();
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(target: "playback", "Timed out waiting for device to drain");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        // Let the device play out its own buffer
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    fn abort(&mut self) {
        self.tx.take();
        let _ = self.stream.pause();
    }
}

fn pick_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        let mut devices = host
            .output_devices()
            .map_err(|e| AudioError::Playback(format!("Failed to enumerate devices: {}", e)))?;
        match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            Some(dev) => {
                info!(target: "playback", device = %name, "Using requested audio device");
                return Ok(dev);
            }
            None => {
                warn!(target: "playback", device = %name, "Requested device not found, falling back to default");
            }
        }
    }
    host.default_output_device()
        .ok_or_else(|| AudioError::Playback("No default output device found".to_string()))
}

/// Prefer a config running at the buffer's own rate; otherwise the device default.
fn pick_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let native = device
        .supported_output_configs()
        .map_err(|e| AudioError::Playback(format!("Failed to get device configs: {}", e)))?
        .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate);
    if let Some(range) = native {
        let supported = range.with_sample_rate(cpal::SampleRate(sample_rate));
        return Ok((supported.config(), supported.sample_format()));
    }

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Playback(format!("Failed to get default config: {}", e)))?;
    Ok((supported.config(), supported.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    rx: Receiver<Vec<f32>>,
    drained: &Arc<AtomicBool>,
    error_flag: &Arc<AtomicBool>,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let drained = Arc::clone(drained);
    let error_flag = Arc::clone(error_flag);
    let mut current: Vec<f32> = Vec::new();
    let mut idx = 0usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    if idx >= current.len() {
                        match rx.try_recv() {
                            Ok(next) => {
                                current = next;
                                idx = 0;
                            }
                            Err(TryRecvError::Empty) => {}
                            Err(TryRecvError::Disconnected) => drained.store(true, Ordering::SeqCst),
                        }
                    }
                    let value = if idx < current.len() {
                        idx += 1;
                        current[idx - 1]
                    } else {
                        0.0
                    };
                    let sample = T::from_sample(value);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            move |err| {
                error!(target: "playback", error = %err, "Audio stream error");
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| AudioError::Playback(format!("Failed to build stream: {}", e)))
}

/// Streaming linear-interpolation rate converter
struct LinearResampler {
    /// Input samples advanced per output sample
    step: f64,
    /// Read position; index 0 is the last sample of the previous block
    pos: f64,
    prev: f32,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate as f64 / to_rate as f64,
            pos: 1.0,
            prev: 0.0,
        }
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if input.is_empty() {
            return;
        }
        if (self.step - 1.0).abs() < f64::EPSILON {
            out.extend_from_slice(input);
            return;
        }
        let at = |i: usize| if i == 0 { self.prev } else { input[i - 1] };
        let last = input.len() as f64;
        while self.pos <= last {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = at(i);
            let b = if i < input.len() { at(i + 1) } else { a };
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }
        self.pos -= last;
        self.prev = input[input.len() - 1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_returns_once_cancelled() {
        // Receiver alive but never drained, as with a stalled device
        let (tx, _rx) = bounded::<Vec<f32>>(1);
        tx.send(vec![0.0]).unwrap();
        let error_flag = AtomicBool::new(false);
        let cancel = CancelFlag::new();

        let canceller = cancel.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        let started = Instant::now();
        let sent = send_block(&tx, vec![1.0], &error_flag, &cancel).unwrap();
        t.join().unwrap();

        assert!(!sent);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_send_fails_on_device_error() {
        let (tx, _rx) = bounded::<Vec<f32>>(1);
        tx.send(vec![0.0]).unwrap();
        let error_flag = AtomicBool::new(true);
        let err = send_block(&tx, vec![1.0], &error_flag, &CancelFlag::new()).unwrap_err();
        assert_eq!(err, AudioError::Playback("audio device reported an error".to_string()));
    }

    #[test]
    fn test_send_with_room_is_immediate() {
        let (tx, rx) = bounded::<Vec<f32>>(1);
        let error_flag = AtomicBool::new(false);
        assert!(send_block(&tx, vec![0.5], &error_flag, &CancelFlag::new()).unwrap());
        assert_eq!(rx.try_recv().unwrap(), vec![0.5]);
    }

    #[test]
    fn test_resampler_passthrough() {
        let mut r = LinearResampler::new(24_000, 24_000);
        let mut out = Vec::new();
        r.process(&[0.1, 0.2, 0.3], &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_resampler_doubles_rate() {
        let mut r = LinearResampler::new(24_000, 48_000);
        let mut out = Vec::new();
        r.process(&[0.0, 1.0], &mut out);
        r.process(&[1.0, 0.0], &mut out);
        let expected = [0.0, 0.5, 1.0, 1.0, 1.0, 0.5, 0.0];
        assert_eq!(out.len(), expected.len());
        for (got, want) in out.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }
}
