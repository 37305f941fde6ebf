//! Chunk decoder using symphonia
//!
//! Decodes one chunk's encoded bytes, held entirely in memory, to interleaved
//! f32 PCM. Chunks are small (seconds of audio), so there is no streaming
//! decode: the whole chunk is decoded at once on the blocking pool.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::types::PcmBuffer;
use crate::error::{Error, Result};
use crate::stream::CodecInfo;

/// Container extension for a MIME type, used as a probe hint
fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "audio/webm" | "video/webm" => Some("webm"),
        "audio/x-matroska" | "audio/matroska" => Some("mka"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" | "audio/aacp" => Some("aac"),
        _ => None,
    }
}

/// Decoder for in-memory chunks
pub struct ChunkDecoder;

impl ChunkDecoder {
    /// Decode `bytes` of chunk `index` to PCM.
    ///
    /// # Errors
    /// `ChunkDecode` if the container cannot be probed, has no audio track,
    /// or yields zero frames. Single corrupt packets are skipped.
    pub fn decode(index: usize, bytes: Vec<u8>, codec: &CodecInfo) -> Result<PcmBuffer> {
        let decode_error = |reason: String| Error::ChunkDecode { index, reason };

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(mime_type) = codec.mime_type.as_deref() {
            hint.mime_type(mime_type);
            if let Some(ext) = extension_for_mime(mime_type) {
                hint.with_extension(ext);
            }
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| decode_error(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| decode_error("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| decode_error(format!("Failed to create decoder: {}", e)))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count() as u16);
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    warn!("Chunk {}: error reading packet: {}", index, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate.get_or_insert(spec.rate);
                    channels.get_or_insert(spec.channels.count() as u16);

                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(sample_buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    skipped_packets += 1;
                    warn!("Chunk {}: skipping corrupt packet: {}", index, e);
                }
                Err(e) => {
                    warn!("Chunk {}: decoder stopped: {}", index, e);
                    break;
                }
            }
        }

        let sample_rate = sample_rate.ok_or_else(|| decode_error("Sample rate not found".to_string()))?;
        let channels = channels
            .filter(|c| *c > 0)
            .ok_or_else(|| decode_error("Channel count not found".to_string()))?;

        let buffer = PcmBuffer::new(samples, sample_rate, channels);
        if buffer.is_empty() {
            return Err(decode_error("Decoded zero frames".to_string()));
        }

        debug!(
            "Chunk {} decoded: {} frames, {}Hz, {} channel(s), {:.3}s, {} packet(s) skipped",
            index,
            buffer.frames(),
            sample_rate,
            channels,
            buffer.duration_secs(),
            skipped_packets
        );

        Ok(buffer)
    }
}
