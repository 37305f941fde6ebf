//! HTTP chunk source
//!
//! Contract, relative to the configured base URL:
//! - `GET {base}/stream/{trackId}/metadata` returns JSON stream metadata
//! - `GET {base}/stream/{trackId}/chunk/{index}?enhanced=..&preset=..&intensity=..`
//!   returns encoded audio bytes; a 0-byte body is an error

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use super::metadata::{MetadataResponse, StreamMetadata};
use super::source::{ChunkSource, ProcessingProfile};
use crate::config::EngineConfig;
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("lapstream-player/", env!("CARGO_PKG_VERSION"));

/// Chunk service client
pub struct HttpChunkSource {
    http_client: reqwest::Client,
    base_url: Url,
    cache_tier_header: String,
}

impl HttpChunkSource {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("Base URL {} cannot carry a path", base_url)));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            cache_tier_header: "x-cache-tier".to_string(),
        })
    }

    /// Build from engine configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut source = Self::new(&config.base_url, config.request_timeout())?;
        source.cache_tier_header = config.cache_tier_header.to_ascii_lowercase();
        Ok(source)
    }

    /// `{base}/stream/{trackId}/{tail...}` with every segment percent-encoded
    fn stream_url(&self, track_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("Base URL {} cannot carry a path", self.base_url)))?;
            segments.pop_if_empty().push("stream").push(track_id).extend(tail);
        }
        Ok(url)
    }

    pub fn metadata_url(&self, track_id: &str) -> Result<Url> {
        self.stream_url(track_id, &["metadata"])
    }

    pub fn chunk_url(&self, track_id: &str, index: usize, profile: &ProcessingProfile) -> Result<Url> {
        let index = index.to_string();
        let mut url = self.stream_url(track_id, &["chunk", &index])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("enhanced", if profile.enhanced { "true" } else { "false" });
            if let Some(preset) = &profile.preset {
                query.append_pair("preset", preset);
            }
            query.append_pair("intensity", &profile.intensity.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn fetch_metadata(&self, track_id: &str) -> Result<StreamMetadata> {
        let unavailable = |reason: String| Error::MetadataUnavailable {
            track_id: track_id.to_string(),
            reason,
        };

        let url = self.metadata_url(track_id)?;
        debug!(track_id = %track_id, url = %url, "Fetching stream metadata");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status)));
        }

        let body: MetadataResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed metadata: {}", e)))?;

        StreamMetadata::from_response(body)
    }

    async fn fetch_chunk(&self, track_id: &str, index: usize, profile: &ProcessingProfile) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| Error::ChunkFetch { index, reason };

        let url = self.chunk_url(track_id, index, profile)?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let tier = response
            .headers()
            .get(self.cache_tier_header.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| fetch_error(e.to_string()))?;
        if bytes.is_empty() {
            return Err(fetch_error("empty response body".to_string()));
        }

        debug!(
            track_id = %track_id,
            chunk = index,
            bytes = bytes.len(),
            cache_tier = %tier,
            "Fetched chunk"
        );

        Ok(bytes.to_vec())
    }
}
