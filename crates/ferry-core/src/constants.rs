//! Protocol and configuration constants for ferry.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Maximum encoded chunk frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Worst-case encoded overhead of a data chunk's non-payload fields.
///
/// Covers the tag and maximum varint width of every field other than the
/// payload bytes, plus the payload's own tag and length prefix. Copy buffers
/// for inbound chunks are sized `max_chunk_size_bytes + CHUNK_OVERHEAD_BYTES`.
pub const CHUNK_OVERHEAD_BYTES: usize = 64;

// =============================================================================
// Flow Control Defaults
// =============================================================================

/// Default per-chunk payload ceiling (32 KiB).
pub const DEFAULT_CHUNK_DATA_SIZE: u32 = 32 * 1024;

/// Default receive window ceiling. Matches the chunk data buffer size so a
/// single grant never outruns the local staging buffer.
pub const DEFAULT_MAX_PENDING_BYTES: u32 = DEFAULT_CHUNK_DATA_SIZE;

// =============================================================================
// Timing Constants
// =============================================================================

/// Default per-chunk deadline before a retransmit attempt.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default retransmit attempts before giving up with a deadline error.
pub const DEFAULT_MAX_RETRIES: u8 = 3;

// =============================================================================
// Resource Defaults
// =============================================================================

/// Default number of concurrent transfer context slots.
pub const DEFAULT_TRANSFER_CONTEXTS: usize = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_fits_in_frame() {
        assert!(CHUNK_OVERHEAD_BYTES < MAX_FRAME_SIZE);
        assert!((DEFAULT_CHUNK_DATA_SIZE as usize) + CHUNK_OVERHEAD_BYTES < MAX_FRAME_SIZE);
    }

    #[test]
    fn window_covers_at_least_one_chunk() {
        assert!(DEFAULT_MAX_PENDING_BYTES >= DEFAULT_CHUNK_DATA_SIZE);
    }

    #[test]
    fn at_least_one_context() {
        assert!(DEFAULT_TRANSFER_CONTEXTS >= 1);
    }
}
