//! Audio graph: the single gain-controlled mixing point
//!
//! At most two playback nodes sound at once (the crossfade pair). The engine
//! starts and stops nodes; the graph never decides when a node ends. Timing is
//! owned by the engine's timers, computed from each chunk's play duration.
//!
//! The mixer only sums frames. Buffers must already be at the output rate
//! (see `Resampler`), and rendering happens on a feeder thread that hands
//! finished blocks to the device through a `PlayoutBuffer`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::types::PcmBuffer;
use crate::error::{Error, Result};

/// Most nodes that may sound simultaneously
pub const MAX_ACTIVE_NODES: usize = 2;

/// Identifier of a started node
pub type NodeId = u64;

/// Request to sound part of a decoded chunk
#[derive(Debug, Clone)]
pub struct PlaybackNode {
    pub chunk_index: usize,
    pub buffer: Arc<PcmBuffer>,
    /// Start position inside the buffer
    pub offset_secs: f64,
    /// Seconds to sound from `offset_secs`
    pub duration_secs: f64,
}

/// Summary of a sounding node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNode {
    pub id: NodeId,
    pub chunk_index: usize,
    pub offset_secs: f64,
    pub duration_secs: f64,
}

/// Output graph shared by all playback nodes
pub trait AudioGraph: Send + Sync {
    /// Start sounding a node immediately.
    ///
    /// If `MAX_ACTIVE_NODES` are already sounding the oldest is evicted.
    fn start_node(&self, node: PlaybackNode) -> Result<NodeId>;

    /// Stop one node; unknown ids are ignored
    fn stop_node(&self, id: NodeId);

    fn stop_all(&self);

    /// Master volume, already clamped to `[0, 1]` by the caller
    fn set_volume(&self, volume: f32);

    /// Nodes currently sounding, oldest first
    fn active_nodes(&self) -> Vec<ActiveNode>;

    /// Rate every started buffer must have; `None` accepts any rate
    fn sample_rate(&self) -> Option<u32> {
        None
    }
}

struct MixNode {
    id: NodeId,
    chunk_index: usize,
    buffer: Arc<PcmBuffer>,
    offset_secs: f64,
    duration_secs: f64,
    /// Next frame to mix
    position: usize,
    /// Exclusive end frame
    end: usize,
}

impl MixNode {
    fn summary(&self) -> ActiveNode {
        ActiveNode {
            id: self.id,
            chunk_index: self.chunk_index,
            offset_secs: self.offset_secs,
            duration_secs: self.duration_secs,
        }
    }
}

struct MixerState {
    nodes: VecDeque<MixNode>,
    volume: f32,
    next_id: NodeId,
}

/// In-process mixing graph
///
/// Without a device attached it is headless: nodes are tracked and stopped by
/// the engine but never rendered. `PlayoutFeeder` pulls samples via `render`.
pub struct MixerGraph {
    state: Mutex<MixerState>,
    output_rate: u32,
    output_channels: u16,
}

impl MixerGraph {
    pub fn new(output_rate: u32, output_channels: u16) -> Self {
        Self {
            state: Mutex::new(MixerState {
                nodes: VecDeque::with_capacity(MAX_ACTIVE_NODES),
                volume: 1.0,
                next_id: 1,
            }),
            output_rate: output_rate.max(1),
            output_channels: output_channels.max(1),
        }
    }

    /// Headless graph at 44.1kHz stereo
    pub fn headless() -> Self {
        Self::new(44_100, 2)
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn lock(&self) -> MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mix all active nodes into interleaved `out`.
    ///
    /// Mono sources feed every output channel. The result is scaled by the
    /// master volume and clipped to `[-1, 1]`.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.output_channels as usize;
        let mut state = self.lock();
        let volume = state.volume;

        for node in state.nodes.iter_mut() {
            for frame in out.chunks_mut(channels) {
                if node.position >= node.end {
                    break;
                }
                for (channel, slot) in frame.iter_mut().enumerate() {
                    *slot += node.buffer.sample(node.position, channel);
                }
                node.position += 1;
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * volume).clamp(-1.0, 1.0);
        }
    }
}

impl AudioGraph for MixerGraph {
    fn start_node(&self, node: PlaybackNode) -> Result<NodeId> {
        if node.buffer.sample_rate != self.output_rate {
            return Err(Error::AudioOutput(format!(
                "chunk {} is at {}Hz, graph runs at {}Hz",
                node.chunk_index, node.buffer.sample_rate, self.output_rate
            )));
        }

        let mut state = self.lock();

        while state.nodes.len() >= MAX_ACTIVE_NODES {
            if let Some(evicted) = state.nodes.pop_front() {
                warn!(
                    "Graph already has {} nodes, evicting node {} (chunk {})",
                    MAX_ACTIVE_NODES, evicted.id, evicted.chunk_index
                );
            }
        }

        let id = state.next_id;
        state.next_id += 1;

        let rate = node.buffer.sample_rate as f64;
        let frames = node.buffer.frames();
        let start = ((node.offset_secs.max(0.0) * rate).round() as usize).min(frames);
        let end = (start + (node.duration_secs.max(0.0) * rate).round() as usize).min(frames);

        debug!(
            "Node {} started: chunk {} at {:.3}s for {:.3}s",
            id, node.chunk_index, node.offset_secs, node.duration_secs
        );

        state.nodes.push_back(MixNode {
            id,
            chunk_index: node.chunk_index,
            buffer: node.buffer,
            offset_secs: node.offset_secs,
            duration_secs: node.duration_secs,
            position: start,
            end,
        });

        Ok(id)
    }

    fn stop_node(&self, id: NodeId) {
        let mut state = self.lock();
        state.nodes.retain(|n| n.id != id);
    }

    fn stop_all(&self) {
        self.lock().nodes.clear();
    }

    fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn active_nodes(&self) -> Vec<ActiveNode> {
        self.lock().nodes.iter().map(MixNode::summary).collect()
    }

    fn sample_rate(&self) -> Option<u32> {
        Some(self.output_rate)
    }
}
