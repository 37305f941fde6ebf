//! Audio subsystem: decoding, resampling, mixing and device output

pub mod decoder;
pub mod graph;
#[cfg(feature = "device-output")]
pub mod output;
pub mod playout;
pub mod resampler;
pub mod types;

pub use decoder::ChunkDecoder;
pub use graph::{ActiveNode, AudioGraph, MixerGraph, NodeId, PlaybackNode, MAX_ACTIVE_NODES};
#[cfg(feature = "device-output")]
pub use output::DeviceOutput;
pub use playout::{PlayoutBuffer, PlayoutFeeder, PlayoutReader};
pub use resampler::Resampler;
pub use types::PcmBuffer;
