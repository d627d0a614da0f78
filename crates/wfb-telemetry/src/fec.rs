use serde::{Deserialize, Serialize};

/// Cumulative counters published by the FEC decoder.
///
/// Every field only ever grows; the aggregator consumes the difference
/// between two chronologically ordered snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FecDecoderStats {
    /// FEC blocks (sequences) seen.
    pub total_blocks: u32,
    /// Packets seen across all blocks.
    pub total_packets: u32,
    /// Packets lost and not repaired.
    pub dropped_packets: u32,
    /// Blocks that could not be reconstructed.
    pub dropped_blocks: u32,
    /// Payload bytes decoded.
    pub bytes: u32,
}
