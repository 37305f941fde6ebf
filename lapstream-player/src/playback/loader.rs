//! Chunk fetch + decode pipeline
//!
//! One network request per chunk, then decode and resample to the graph's
//! output rate on the blocking pool. Cache
//! lookup and slot bookkeeping belong to the engine; this module only turns a
//! request into a PCM buffer or a per-chunk error. It never retries.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::audio::{ChunkDecoder, PcmBuffer, Resampler};
use crate::error::{Error, Result};
use crate::stream::{ChunkSource, CodecInfo, ProcessingProfile};

/// Everything needed to load one chunk, detached from engine state
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub track_id: String,
    pub chunk_index: usize,
    pub profile: ProcessingProfile,
    pub codec: CodecInfo,
    /// Rate the decoded buffer must be delivered at (`None` keeps the source rate)
    pub output_rate: Option<u32>,
}

/// Fetch and decode one chunk.
///
/// # Errors
/// - `ChunkFetch` for transport failures, non-success responses and empty bodies
/// - `ChunkDecode` for undecodable audio or a failed rate conversion
pub async fn fetch_and_decode(source: Arc<dyn ChunkSource>, request: ChunkRequest) -> Result<Arc<PcmBuffer>> {
    let index = request.chunk_index;
    let started = Instant::now();

    let bytes = source
        .fetch_chunk(&request.track_id, index, &request.profile)
        .await?;

    if bytes.is_empty() {
        return Err(Error::ChunkFetch {
            index,
            reason: "empty response body".to_string(),
        });
    }

    let byte_count = bytes.len();
    let codec = request.codec.clone();
    let output_rate = request.output_rate;
    let buffer = tokio::task::spawn_blocking(move || {
        let decoded = ChunkDecoder::decode(index, bytes, &codec)?;
        match output_rate {
            Some(rate) => Resampler::resample(index, decoded, rate),
            None => Ok(decoded),
        }
    })
    .await
    .map_err(|e| Error::ChunkDecode {
        index,
        reason: format!("decode task failed: {}", e),
    })??;

    debug!(
        "Chunk {} loaded: {} bytes -> {:.3}s PCM in {:?}",
        index,
        byte_count,
        buffer.duration_secs(),
        started.elapsed()
    );

    Ok(Arc::new(buffer))
}
