//! Stream metadata
//!
//! Per-track chunk geometry as reported by the chunk service, validated once
//! and immutable afterwards.
//!
//! Timeline indexing always uses `chunk_interval`; decode and playback length
//! use `chunk_duration`. The difference is the overlap shared by chunk `i` and
//! chunk `i + 1`.

use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::error::{Error, Result};

/// Wire format of `GET {base}/stream/{trackId}/metadata`
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataResponse {
    /// Services send either a string or an integer id
    #[serde(deserialize_with = "string_or_number")]
    pub track_id: String,
    pub duration: f64,
    pub total_chunks: usize,
    pub chunk_duration: f64,
    pub chunk_interval: f64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub codecs: Option<String>,
    #[serde(default)]
    pub format_version: Option<serde_json::Value>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "track_id must be a string or a number, got {}",
            other
        ))),
    }
}

/// Codec description used as a decode hint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodecInfo {
    /// Container MIME type, e.g. `audio/webm`
    pub mime_type: Option<String>,
    /// Codec list, e.g. `opus`
    pub codecs: Option<String>,
}

/// Validated per-track stream geometry
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    pub track_id: String,
    pub total_duration: f64,
    pub chunk_duration: f64,
    pub chunk_interval: f64,
    pub total_chunks: usize,
    pub codec: CodecInfo,
    pub format_version: Option<String>,
}

impl StreamMetadata {
    /// Build and validate metadata.
    ///
    /// Requires `chunk_duration >= chunk_interval > 0`, a positive finite
    /// duration, `total_chunks >= 1`, and a last chunk that starts before the
    /// end of the track.
    pub fn new(
        track_id: impl Into<String>,
        total_duration: f64,
        chunk_duration: f64,
        chunk_interval: f64,
        total_chunks: usize,
        codec: CodecInfo,
    ) -> Result<Self> {
        let track_id = track_id.into();
        let malformed = |reason: String| Error::MetadataUnavailable {
            track_id: track_id.clone(),
            reason,
        };

        if !(total_duration.is_finite() && total_duration > 0.0) {
            return Err(malformed(format!("invalid duration {}", total_duration)));
        }
        if !(chunk_interval.is_finite() && chunk_interval > 0.0) {
            return Err(malformed(format!("invalid chunk_interval {}", chunk_interval)));
        }
        if !(chunk_duration.is_finite() && chunk_duration >= chunk_interval) {
            return Err(malformed(format!(
                "chunk_duration {} is shorter than chunk_interval {}",
                chunk_duration, chunk_interval
            )));
        }
        if total_chunks == 0 {
            return Err(malformed("total_chunks must be at least 1".to_string()));
        }

        let last_start = (total_chunks - 1) as f64 * chunk_interval;
        if last_start >= total_duration {
            return Err(malformed(format!(
                "{} chunks at {}s interval start past the {}s track",
                total_chunks, chunk_interval, total_duration
            )));
        }

        let expected = Self::expected_chunk_count(total_duration, chunk_interval);
        if expected != total_chunks {
            warn!(
                "Track {} reports {} chunks, geometry implies {}; trusting server",
                track_id, total_chunks, expected
            );
        }

        Ok(Self {
            track_id,
            total_duration,
            chunk_duration,
            chunk_interval,
            total_chunks,
            codec,
            format_version: None,
        })
    }

    /// Validate a wire response
    pub fn from_response(response: MetadataResponse) -> Result<Self> {
        let format_version = response.format_version.as_ref().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let mut metadata = Self::new(
            response.track_id,
            response.duration,
            response.chunk_duration,
            response.chunk_interval,
            response.total_chunks,
            CodecInfo {
                mime_type: response.mime_type,
                codecs: response.codecs,
            },
        )?;
        metadata.format_version = format_version;
        Ok(metadata)
    }

    /// `ceil(duration / interval)`
    pub fn expected_chunk_count(total_duration: f64, chunk_interval: f64) -> usize {
        (total_duration / chunk_interval).ceil() as usize
    }

    /// Seconds shared between chunk `i` and chunk `i + 1`
    pub fn overlap(&self) -> f64 {
        self.chunk_duration - self.chunk_interval
    }

    /// Track-timeline start of a chunk
    pub fn timeline_start(&self, index: usize) -> f64 {
        index as f64 * self.chunk_interval
    }

    /// Track-timeline end of a chunk (exclusive), capped at the track duration
    pub fn timeline_end(&self, index: usize) -> f64 {
        ((index + 1) as f64 * self.chunk_interval).min(self.total_duration)
    }

    pub fn is_last_chunk(&self, index: usize) -> bool {
        index + 1 >= self.total_chunks
    }

    pub fn last_chunk(&self) -> usize {
        self.total_chunks - 1
    }

    /// Clamp a requested position into `[0, duration]`
    pub fn clamp_time(&self, time: f64) -> f64 {
        time.clamp(0.0, self.total_duration)
    }

    /// Chunk index and offset into that chunk for a timeline position.
    ///
    /// The position is clamped into the track first. Positions at or past the
    /// last chunk's start resolve to the last chunk.
    pub fn locate(&self, time: f64) -> (usize, f64) {
        let time = self.clamp_time(time);
        let index = ((time / self.chunk_interval).floor() as usize).min(self.last_chunk());
        let offset = (time - self.timeline_start(index)).max(0.0);
        (index, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> StreamMetadata {
        StreamMetadata::new("t1", 95.0, 15.0, 10.0, 10, CodecInfo::default()).unwrap()
    }

    #[test]
    fn test_scenario_geometry() {
        let meta = scenario();
        assert_eq!(StreamMetadata::expected_chunk_count(95.0, 10.0), 10);
        assert_eq!(meta.overlap(), 5.0);
        assert_eq!(meta.timeline_start(0), 0.0);
        assert_eq!(meta.timeline_end(0), 10.0);
        assert_eq!(meta.timeline_start(9), 90.0);
        assert_eq!(meta.timeline_end(9), 95.0);
        assert!(meta.is_last_chunk(9));
        assert!(!meta.is_last_chunk(8));
    }

    #[test]
    fn test_overlap_never_negative() {
        for (duration, interval) in [(10.0, 10.0), (15.0, 10.0), (4.5, 3.0), (30.0, 0.5)] {
            let meta = StreamMetadata::new("t", 60.0, duration, interval, 1, CodecInfo::default()).unwrap();
            assert!(meta.overlap() >= 0.0);
            assert_eq!(meta.overlap(), duration - interval);
        }
    }

    #[test]
    fn test_rejects_duration_shorter_than_interval() {
        let result = StreamMetadata::new("t", 95.0, 8.0, 10.0, 10, CodecInfo::default());
        assert!(matches!(result, Err(Error::MetadataUnavailable { .. })));
    }

    #[test]
    fn test_rejects_zero_interval_and_zero_chunks() {
        assert!(StreamMetadata::new("t", 95.0, 15.0, 0.0, 10, CodecInfo::default()).is_err());
        assert!(StreamMetadata::new("t", 95.0, 15.0, 10.0, 0, CodecInfo::default()).is_err());
        assert!(StreamMetadata::new("t", f64::NAN, 15.0, 10.0, 1, CodecInfo::default()).is_err());
    }

    #[test]
    fn test_rejects_chunks_past_track_end() {
        let result = StreamMetadata::new("t", 95.0, 15.0, 10.0, 11, CodecInfo::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_locate_uses_interval() {
        let meta = scenario();
        assert_eq!(meta.locate(0.0), (0, 0.0));
        assert_eq!(meta.locate(42.0), (4, 2.0));
        assert_eq!(meta.locate(30.0), (3, 0.0));
        assert_eq!(meta.locate(95.0), (9, 5.0));
        assert_eq!(meta.locate(500.0), (9, 5.0));
        assert_eq!(meta.locate(-3.0), (0, 0.0));
    }

    #[test]
    fn test_from_response() {
        let json = r#"{
            "track_id": "abc",
            "duration": 95.0,
            "total_chunks": 10,
            "chunk_duration": 15.0,
            "chunk_interval": 10.0,
            "mime_type": "audio/webm",
            "codecs": "opus",
            "format_version": 2
        }"#;
        let response: MetadataResponse = serde_json::from_str(json).unwrap();
        let meta = StreamMetadata::from_response(response).unwrap();
        assert_eq!(meta.track_id, "abc");
        assert_eq!(meta.codec.mime_type.as_deref(), Some("audio/webm"));
        assert_eq!(meta.codec.codecs.as_deref(), Some("opus"));
        assert_eq!(meta.format_version.as_deref(), Some("2"));
    }

    #[test]
    fn test_numeric_track_id() {
        let json = r#"{
            "track_id": 42,
            "duration": 25.0,
            "total_chunks": 3,
            "chunk_duration": 15.0,
            "chunk_interval": 10.0
        }"#;
        let response: MetadataResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.track_id, "42");
        let meta = StreamMetadata::from_response(response).unwrap();
        assert_eq!(meta.track_id, "42");
    }

    #[test]
    fn test_rejects_non_scalar_track_id() {
        let json = r#"{
            "track_id": {"id": 1},
            "duration": 25.0,
            "total_chunks": 3,
            "chunk_duration": 15.0,
            "chunk_interval": 10.0
        }"#;
        assert!(serde_json::from_str::<MetadataResponse>(json).is_err());
    }
}
