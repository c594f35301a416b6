//! Provider payload decoding.
//!
//! Everything that reaches a [`SampleBuffer`] is 16-bit mono at a known rate.
//! Compressed responses go through symphonia; raw PCM arrives base64 encoded.

use crate::buffer::SampleBuffer;
use crate::error::AudioError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode a compressed or containerised payload (MP3, WAV, ...) into mono PCM.
///
/// `extension` is a probe hint such as `"mp3"`; the container is still sniffed.
pub fn decode_compressed(bytes: &[u8], extension: Option<&str>) -> Result<SampleBuffer, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Decode("empty audio payload".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::Decode(format!("unrecognised audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("unsupported codec: {}", e)))?;

    let mut mono: Vec<i16> = Vec::new();
    let mut interleaved: Option<InterleavedBuffer<i16>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, not fatal
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(target: "decode", error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(AudioError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);

        let needed = decoded.capacity() * channels;
        if interleaved.as_ref().map_or(true, |b| b.capacity() < needed) {
            interleaved = Some(InterleavedBuffer::<i16>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = interleaved.as_mut() {
            buf.copy_interleaved_ref(decoded);
            downmix_into(buf.samples(), channels, &mut mono);
        }
    }

    if mono.is_empty() {
        return Err(AudioError::Decode("payload contained no audio frames".to_string()));
    }
    let rate = sample_rate
        .ok_or_else(|| AudioError::Decode("stream has no sample rate".to_string()))?;

    debug!(target: "decode", samples = mono.len(), sample_rate = rate, "Decoded payload");
    SampleBuffer::from_samples(&mono, rate)
}

/// Average interleaved frames down to one channel
fn downmix_into(interleaved: &[i16], channels: usize, out: &mut Vec<i16>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(interleaved.chunks_exact(channels).map(|frame| {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        (sum / channels as i32) as i16
    }));
}

/// Decode base64 raw 16-bit little-endian mono PCM.
pub fn decode_base64_pcm(data: &str, sample_rate: u32) -> Result<SampleBuffer, AudioError> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| AudioError::Decode(format!("invalid base64 audio: {}", e)))?;
    if bytes.is_empty() {
        return Err(AudioError::Decode("empty audio payload".to_string()));
    }
    SampleBuffer::new(bytes, sample_rate)
}

/// Rate parameter of a PCM mime type, e.g. `audio/L16;codec=pcm;rate=24000`.
pub fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|part| part.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())
        .filter(|rate| *rate > 0)
}
