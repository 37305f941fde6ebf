//! Shared test infrastructure for lapstream-player integration tests
//!
//! - `MockChunkSource`: in-memory chunk service serving WAV chunks with
//!   per-chunk fault injection
//! - `RecordingGraph`: audio graph that records node starts instead of sounding
//! - Event helpers for waiting on engine events under a paused clock

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lapstream_common::events::{PlayerEvent, PlayerState};
use lapstream_player::audio::{ActiveNode, AudioGraph, NodeId, PlaybackNode, MAX_ACTIVE_NODES};
use lapstream_player::stream::{ChunkSource, CodecInfo, ProcessingProfile, StreamMetadata};
use lapstream_player::{EngineConfig, Error, PlaybackEngine, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

/// Sample rate of generated chunks (low to keep decode cheap)
pub const TEST_SAMPLE_RATE: u32 = 8_000;

/// Build a mono 16-bit WAV file of `seconds` of a quiet tone
pub fn wav_bytes(seconds: f64, frequency: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (seconds * TEST_SAMPLE_RATE as f64).round() as usize;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for i in 0..frames {
            let t = i as f32 / TEST_SAMPLE_RATE as f32;
            let sample = (t * frequency * 2.0 * std::f32::consts::PI).sin() * 0.25;
            writer.write_sample((sample * i16::MAX as f32) as i16).expect("wav sample");
        }
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}

/// Fault injected into one chunk index
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail the next `remaining` requests (`None` = always)
    Fail { remaining: Option<usize> },
    /// Respond with a 0-byte body
    EmptyBody,
    /// Respond with bytes that are not audio
    Garbage,
    /// Respond normally after a delay
    Delay(Duration),
}

/// In-memory chunk service
pub struct MockChunkSource {
    track_id: String,
    duration: f64,
    chunk_duration: f64,
    chunk_interval: f64,
    faults: Mutex<HashMap<usize, Fault>>,
    fail_metadata: AtomicBool,
    metadata_delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(usize, ProcessingProfile)>>,
}

impl MockChunkSource {
    pub fn new(track_id: &str, duration: f64, chunk_duration: f64, chunk_interval: f64) -> Self {
        Self {
            track_id: track_id.to_string(),
            duration,
            chunk_duration,
            chunk_interval,
            faults: Mutex::new(HashMap::new()),
            fail_metadata: AtomicBool::new(false),
            metadata_delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 95s track, 15s chunks every 10s: 10 chunks, the last one 5s long
    pub fn standard() -> Self {
        Self::new("track-1", 95.0, 15.0, 10.0)
    }

    pub fn inject(&self, index: usize, fault: Fault) {
        self.faults.lock().unwrap().insert(index, fault);
    }

    pub fn clear_fault(&self, index: usize) {
        self.faults.lock().unwrap().remove(&index);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    pub fn delay_metadata(&self, delay: Duration) {
        *self.metadata_delay.lock().unwrap() = Some(delay);
    }

    /// Every chunk request seen, in order
    pub fn requests(&self) -> Vec<(usize, ProcessingProfile)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, index: usize) -> usize {
        self.requests.lock().unwrap().iter().filter(|(i, _)| *i == index).count()
    }

    pub fn chunk_count(&self) -> usize {
        (self.duration / self.chunk_interval).ceil() as usize
    }

    /// Audio length of chunk `index`
    pub fn chunk_length(&self, index: usize) -> f64 {
        let start = index as f64 * self.chunk_interval;
        self.chunk_duration.min(self.duration - start)
    }

    fn metadata(&self, track_id: &str) -> Result<StreamMetadata> {
        StreamMetadata::new(
            track_id,
            self.duration,
            self.chunk_duration,
            self.chunk_interval,
            self.chunk_count(),
            CodecInfo {
                mime_type: Some("audio/wav".to_string()),
                codecs: None,
            },
        )
    }

    /// Tone frequency encodes the processing identity so variants differ
    fn frequency(profile: &ProcessingProfile) -> f32 {
        match (profile.enhanced, profile.preset.as_deref()) {
            (false, _) => 220.0,
            (true, Some("warm")) => 330.0,
            (true, Some("bright")) => 660.0,
            (true, _) => 440.0,
        }
    }
}

#[async_trait]
impl ChunkSource for MockChunkSource {
    async fn fetch_metadata(&self, track_id: &str) -> Result<StreamMetadata> {
        let delay = *self.metadata_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_metadata.load(Ordering::SeqCst) || track_id != self.track_id {
            return Err(Error::MetadataUnavailable {
                track_id: track_id.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        self.metadata(track_id)
    }

    async fn fetch_chunk(&self, _track_id: &str, index: usize, profile: &ProcessingProfile) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push((index, profile.clone()));

        let fault = {
            let mut faults = self.faults.lock().unwrap();
            match faults.get_mut(&index) {
                Some(Fault::Fail { remaining: Some(n) }) => {
                    *n -= 1;
                    let fault = Fault::Fail { remaining: Some(*n) };
                    if *n == 0 {
                        faults.remove(&index);
                    }
                    Some(fault)
                }
                other => other.cloned(),
            }
        };

        match fault {
            Some(Fault::Fail { .. }) => Err(Error::ChunkFetch {
                index,
                reason: "HTTP 500 Internal Server Error".to_string(),
            }),
            Some(Fault::EmptyBody) => Err(Error::ChunkFetch {
                index,
                reason: "empty response body".to_string(),
            }),
            Some(Fault::Garbage) => Ok(b"definitely not an audio container".repeat(8)),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(wav_bytes(self.chunk_length(index), Self::frequency(profile)))
            }
            None => Ok(wav_bytes(self.chunk_length(index), Self::frequency(profile))),
        }
    }
}

/// A node start observed by `RecordingGraph`
#[derive(Debug, Clone)]
pub struct NodeStart {
    pub chunk_index: usize,
    pub offset_secs: f64,
    pub duration_secs: f64,
    pub at: Instant,
}

/// Audio graph that records what the engine asks it to sound
pub struct RecordingGraph {
    starts: Mutex<Vec<NodeStart>>,
    active: Mutex<VecDeque<ActiveNode>>,
    max_active: AtomicUsize,
    next_id: AtomicU64,
    volume: Mutex<f32>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self {
            starts: Mutex::new(Vec::new()),
            active: Mutex::new(VecDeque::new()),
            max_active: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            volume: Mutex::new(1.0),
        }
    }

    pub fn starts(&self) -> Vec<NodeStart> {
        self.starts.lock().unwrap().clone()
    }

    /// Most nodes ever sounding together
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }
}

impl AudioGraph for RecordingGraph {
    fn start_node(&self, node: PlaybackNode) -> Result<NodeId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut active = self.active.lock().unwrap();
        while active.len() >= MAX_ACTIVE_NODES {
            active.pop_front();
        }
        active.push_back(ActiveNode {
            id,
            chunk_index: node.chunk_index,
            offset_secs: node.offset_secs,
            duration_secs: node.duration_secs,
        });
        self.max_active.fetch_max(active.len(), Ordering::SeqCst);

        self.starts.lock().unwrap().push(NodeStart {
            chunk_index: node.chunk_index,
            offset_secs: node.offset_secs,
            duration_secs: node.duration_secs,
            at: Instant::now(),
        });
        Ok(id)
    }

    fn stop_node(&self, id: NodeId) {
        self.active.lock().unwrap().retain(|n| n.id != id);
    }

    fn stop_all(&self) {
        self.active.lock().unwrap().clear();
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = volume;
    }

    fn active_nodes(&self) -> Vec<ActiveNode> {
        self.active.lock().unwrap().iter().copied().collect()
    }
}

/// Engine wired to a mock source and a recording graph
pub struct TestPlayer {
    pub engine: PlaybackEngine,
    pub source: Arc<MockChunkSource>,
    pub graph: Arc<RecordingGraph>,
}

impl TestPlayer {
    pub fn new(source: MockChunkSource) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: MockChunkSource, config: EngineConfig) -> Self {
        let source = Arc::new(source);
        let graph = Arc::new(RecordingGraph::new());
        let engine = PlaybackEngine::new(config, source.clone(), graph.clone()).expect("engine");
        Self { engine, source, graph }
    }

    /// Standard track, already loaded
    pub async fn loaded() -> Self {
        let player = Self::new(MockChunkSource::standard());
        player.engine.load_track("track-1").await.expect("load_track");
        player
    }
}

/// Receive events until `matches` accepts one, failing after `within`
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    within: Duration,
    mut matches: F,
) -> PlayerEvent
where
    F: FnMut(&PlayerEvent) -> bool,
{
    let result = tokio::time::timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;
    result.expect("timed out waiting for event")
}

/// Wait for a transition into `state`
pub async fn wait_for_state(rx: &mut broadcast::Receiver<PlayerEvent>, state: PlayerState, within: Duration) {
    wait_for_event(rx, within, |event| {
        matches!(event, PlayerEvent::StateChanged { new_state, .. } if *new_state == state)
    })
    .await;
}

/// Assert two times agree within 10ms
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {:.3}s, got {:.3}s",
        expected,
        actual
    );
}
