//! Property-based tests for the chunk codec.
//!
//! Verifies:
//! - Codec roundtrip for arbitrary chunks
//! - Decode never panics on arbitrary input
//! - Encoded size stays within the frame and overhead budgets

#![cfg(test)]

use bytes::Bytes;
use proptest::prelude::*;

use crate::constants::CHUNK_OVERHEAD_BYTES;
use crate::protocol::{Chunk, ChunkCodec, Status};

fn arb_status() -> impl Strategy<Value = Status> {
    (0u32..=16).prop_map(Status::from_code)
}

prop_compose! {
    fn arb_chunk()(
        transfer_id in any::<u32>(),
        pending_bytes in prop::option::of(any::<u32>()),
        max_chunk_size_bytes in prop::option::of(any::<u32>()),
        min_delay_microseconds in prop::option::of(any::<u32>()),
        offset in any::<u64>(),
        data in prop::collection::vec(any::<u8>(), 0..2048),
        remaining_bytes in prop::option::of(any::<u64>()),
        status in prop::option::of(arb_status()),
    ) -> Chunk {
        Chunk {
            transfer_id,
            pending_bytes,
            max_chunk_size_bytes,
            min_delay_microseconds,
            offset,
            data: Bytes::from(data),
            remaining_bytes,
            status,
        }
    }
}

proptest! {
    #[test]
    fn round_trip_fidelity(chunk in arb_chunk()) {
        let encoded = ChunkCodec::encode(&chunk).unwrap();
        let decoded = ChunkCodec::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, chunk);
    }

    #[test]
    fn decode_never_panics(frame in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = ChunkCodec::decode(&frame);
    }

    #[test]
    fn overhead_budget_holds(chunk in arb_chunk()) {
        let encoded = ChunkCodec::encode(&chunk).unwrap();
        prop_assert!(encoded.len() <= chunk.data.len() + CHUNK_OVERHEAD_BYTES);
    }

    #[test]
    fn decoded_frames_reencode(frame in prop::collection::vec(any::<u8>(), 0..256)) {
        // Any frame we accept must encode again without error; field values
        // survive the second trip.
        if let Ok(chunk) = ChunkCodec::decode(&frame) {
            let encoded = ChunkCodec::encode(&chunk).unwrap();
            let again = ChunkCodec::decode(&encoded).unwrap();
            prop_assert_eq!(again, chunk);
        }
    }
}
