//! Service-side write transfers: the service receives blob data.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use ferry_core::config::TransferConfig;
use ferry_core::handler::Handler;
use ferry_core::protocol::{Chunk, ChunkCodec, Status};
use ferry_core::transport::StreamDirection;
use ferry_server::TransferService;
use ferry_test_utils::{pattern, ChunkQueue, QueueTransport, TestWriteHandler};

fn service(config: TransferConfig) -> (TransferService, ChunkQueue) {
    let (transport, _read_queue, write_queue) = QueueTransport::new();
    (TransferService::new(config, transport), write_queue)
}

fn config() -> TransferConfig {
    TransferConfig::default()
        .with_max_pending_bytes(64)
        .with_max_chunk_size_bytes(32)
}

fn setup(
    config: TransferConfig,
    id: u32,
    capacity: usize,
) -> (TransferService, ChunkQueue, Arc<Mutex<TestWriteHandler>>) {
    let (service, out) = service(config);
    let handler = TestWriteHandler::shared(capacity);
    service
        .register_handler(Handler::write_only(id, handler.clone()))
        .unwrap();
    (service, out, handler)
}

fn inject(service: &TransferService, chunk: Chunk) {
    service
        .process_chunk(
            StreamDirection::Write,
            &ChunkCodec::encode(&chunk).unwrap(),
        )
        .unwrap();
}

fn data_chunk(id: u32, offset: u64, data: &[u8], remaining: Option<u64>) -> Chunk {
    Chunk::data(id, offset, Bytes::copy_from_slice(data), remaining)
}

#[test]
fn single_chunk() {
    let (service, out, handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(handler.lock().unwrap().prepare_calls, 1);
    assert_eq!(handler.lock().unwrap().finalize_calls, 0);

    // The grant is capped by the sink's capacity.
    assert_eq!(out.total(), 1);
    let grant = out.last();
    assert_eq!(grant.transfer_id, 7);
    assert_eq!(grant.pending_bytes, Some(32));
    assert_eq!(grant.max_chunk_size_bytes, Some(32));

    inject(&service, data_chunk(7, 0, &blob, Some(0)));
    assert_eq!(out.total(), 2);
    assert_eq!(out.last().status, Some(Status::Ok));

    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
    assert_eq!(handler.written(), blob);
}

#[test]
fn multi_chunk() {
    let (service, out, handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.total(), 1);

    inject(&service, data_chunk(7, 0, &blob[..16], None));
    assert_eq!(out.total(), 1);

    inject(&service, data_chunk(7, 16, &blob[16..], Some(0)));
    assert_eq!(out.total(), 2);
    assert_eq!(out.last().status, Some(Status::Ok));
    assert_eq!(handler.lock().unwrap().written(), blob);
}

#[test]
fn window_replenishes_between_grants() {
    let (service, out, handler) = setup(config().with_max_pending_bytes(16), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.last().pending_bytes, Some(16));

    inject(&service, data_chunk(7, 0, &blob[..8], None));
    assert_eq!(out.total(), 1);

    inject(&service, data_chunk(7, 8, &blob[8..16], None));
    assert_eq!(out.total(), 2);
    let grant = out.last();
    assert_eq!(grant.offset, 16);
    assert_eq!(grant.pending_bytes, Some(16));

    inject(&service, data_chunk(7, 16, &blob[16..24], None));
    assert_eq!(out.total(), 2);

    inject(&service, data_chunk(7, 24, &blob[24..], Some(0)));
    assert_eq!(out.total(), 3);
    assert_eq!(out.last().status, Some(Status::Ok));
    assert_eq!(handler.lock().unwrap().written(), blob);
}

#[test]
fn grant_tracks_small_sinks() {
    let (service, out, _handler) = setup(config(), 987, 8);
    inject(&service, Chunk::initiating(987));
    assert_eq!(out.last().pending_bytes, Some(8));
}

#[test]
fn unexpected_offset_requests_recovery() {
    let (service, out, handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.last().pending_bytes, Some(32));

    inject(&service, data_chunk(7, 0, &blob[..16], None));
    assert_eq!(out.total(), 1);

    // Wrong offset: discarded, with a re-grant naming the expected one.
    inject(&service, data_chunk(7, 8, &blob[16..], Some(0)));
    assert_eq!(out.total(), 2);
    let grant = out.last();
    assert_eq!(grant.offset, 16);
    assert_eq!(grant.pending_bytes, Some(16));

    inject(&service, data_chunk(7, 16, &blob[16..], Some(0)));
    assert_eq!(out.total(), 3);
    assert_eq!(out.last().status, Some(Status::Ok));
    assert_eq!(handler.lock().unwrap().written(), blob);
}

#[test]
fn too_much_data_is_internal() {
    let (service, out, _handler) = setup(config().with_max_pending_bytes(16), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.last().pending_bytes, Some(16));

    inject(&service, data_chunk(7, 0, &blob[..8], None));
    inject(&service, data_chunk(7, 8, &blob[8..12], None));
    // 4 bytes left in the window; 8 arrive.
    inject(&service, data_chunk(7, 12, &blob[12..20], None));

    assert_eq!(out.last().status, Some(Status::Internal));
}

#[test]
fn unregistered_id_is_not_found() {
    let (service, out) = service(config());
    inject(&service, Chunk::initiating(999));

    let response = out.last();
    assert_eq!(response.transfer_id, 999);
    assert_eq!(response.status, Some(Status::NotFound));
}

#[test]
fn wrong_direction_is_permission_denied() {
    let (service, out) = service(config());
    let read_handler = ferry_test_utils::TestReadHandler::shared(pattern(8));
    service
        .register_handler(Handler::read_only(5, read_handler))
        .unwrap();

    // A write initiation for a read-only handler.
    inject(&service, Chunk::initiating(5));
    assert_eq!(out.last().status, Some(Status::PermissionDenied));
}

#[test]
fn peer_error_finalizes_without_response() {
    let (service, out, handler) = setup(config(), 7, 32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.total(), 1);

    inject(&service, Chunk::terminal(7, Status::DataLoss));
    assert_eq!(out.total(), 1);

    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::DataLoss));
}

#[test]
fn drop_recovers_with_a_single_grant() {
    let (service, out, handler) = setup(config().with_max_pending_bytes(32), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.total(), 1);

    inject(&service, data_chunk(7, 0, &blob[..1], None));
    // Offset 1 dropped; the rest arrives byte by byte.
    for offset in 2..blob.len() {
        inject(
            &service,
            data_chunk(7, offset as u64, &blob[offset..offset + 1], None),
        );
    }

    assert_eq!(out.total(), 2);
    let grant = out.last();
    assert_eq!(grant.offset, 1);

    // Remaining data with the sender's final confirmation on board.
    let finishing = Chunk {
        status: Some(Status::Ok),
        ..data_chunk(7, 1, &blob[1..], None)
    };
    inject(&service, finishing);

    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
    assert_eq!(handler.written(), blob);
}

#[test]
fn repeated_chunk_during_recovery_regrants() {
    let (service, out, handler) = setup(config().with_max_pending_bytes(32), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.total(), 1);

    // Offset 0 dropped entirely.
    for offset in 1..blob.len() {
        inject(
            &service,
            data_chunk(7, offset as u64, &blob[offset..offset + 1], None),
        );
    }
    assert_eq!(out.total(), 2);

    // Repeating the same chunk means the re-grant was lost: send it again.
    let last_chunk = data_chunk(7, blob.len() as u64 - 1, &blob[31..], None);
    inject(&service, last_chunk.clone());
    assert_eq!(out.total(), 3);
    inject(&service, last_chunk);
    assert_eq!(out.total(), 4);

    let grant = out.last();
    assert_eq!(grant.offset, 0);
    assert!(grant.requests_transmission());

    let finishing = Chunk {
        status: Some(Status::Ok),
        ..data_chunk(7, 0, &blob, None)
    };
    inject(&service, finishing);
    assert_eq!(handler.lock().unwrap().finalize_status, Some(Status::Ok));
}

#[test]
fn terminal_status_repeats_for_a_retrying_sender() {
    let (service, out, handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    inject(&service, data_chunk(7, 0, &blob, Some(0)));
    assert_eq!(out.total(), 2);
    assert_eq!(out.last().status, Some(Status::Ok));

    // The sender never saw our status and retries its final chunk.
    inject(&service, data_chunk(7, 32, &[], Some(0)));
    assert_eq!(out.total(), 3);
    assert_eq!(out.last().status, Some(Status::Ok));
    // Finalize does not run again.
    assert_eq!(handler.lock().unwrap().finalize_calls, 1);
}

#[test]
fn non_final_chunks_after_completion_fail() {
    let (service, out, _handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    inject(&service, data_chunk(7, 0, &blob, Some(0)));
    assert_eq!(out.last().status, Some(Status::Ok));

    inject(&service, data_chunk(7, 0, &blob, None));
    assert_eq!(out.last().status, Some(Status::FailedPrecondition));
}

#[test]
fn non_initiating_chunks_for_inactive_transfers_fail() {
    let (service, out, handler) = setup(config(), 7, 32);

    inject(
        &service,
        Chunk {
            transfer_id: 7,
            offset: 3,
            ..Default::default()
        },
    );
    inject(&service, data_chunk(7, 0, &pattern(10), None));
    inject(&service, Chunk::terminal(7, Status::Ok));

    // No transfer ever starts; each stray chunk is answered (terminal
    // chunks excepted) and the handler is never touched.
    let handler = handler.lock().unwrap();
    assert_eq!(handler.prepare_calls, 0);
    assert_eq!(handler.finalize_calls, 0);
    assert!(out
        .chunks()
        .iter()
        .all(|c| c.status == Some(Status::FailedPrecondition)));
    assert_eq!(out.total(), 2);
}

#[test]
fn new_initiation_aborts_and_restarts() {
    let (service, out, handler) = setup(config(), 7, 32);
    let blob = pattern(32);

    inject(&service, Chunk::initiating(7));
    inject(&service, data_chunk(7, 0, &blob[..16], None));
    assert_eq!(out.total(), 1);
    assert_eq!(handler.lock().unwrap().prepare_calls, 1);

    // The client restarts from scratch.
    inject(&service, Chunk::initiating(7));
    {
        let handler = handler.lock().unwrap();
        assert_eq!(handler.prepare_calls, 2);
        assert_eq!(handler.finalize_calls, 1);
        assert_eq!(handler.finalize_status, Some(Status::Aborted));
    }
    assert_eq!(out.total(), 2);

    inject(&service, data_chunk(7, 0, &blob, Some(0)));
    assert_eq!(out.total(), 3);
    assert_eq!(out.last().status, Some(Status::Ok));

    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 2);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
    assert_eq!(handler.written(), blob);
}

#[test]
fn rejected_finalize_downgrades_to_data_loss() {
    let (service, out, handler) = setup(config(), 7, 32);
    handler.lock().unwrap().finalize_result = Status::FailedPrecondition;

    inject(&service, Chunk::initiating(7));
    inject(&service, data_chunk(7, 0, &pattern(32), Some(0)));

    assert_eq!(out.last().status, Some(Status::DataLoss));
    // The hook itself saw the successful data completion.
    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
}

#[test]
fn failed_prepare_is_data_loss_and_leaves_no_transfer() {
    let (service, out, handler) = setup(config(), 7, 32);
    handler.lock().unwrap().prepare_result = Status::Unavailable;

    inject(&service, Chunk::initiating(7));
    assert_eq!(out.last().status, Some(Status::DataLoss));
    assert_eq!(service.live_transfers(), 0);

    // A later restart succeeds.
    handler.lock().unwrap().prepare_result = Status::Ok;
    inject(&service, Chunk::initiating(7));
    assert!(out.last().requests_transmission());
}

#[test]
fn context_exhaustion_rejects_the_second_transfer() {
    let (service, out) = service(config().with_transfer_contexts(1));
    let first = TestWriteHandler::shared(32);
    let second = TestWriteHandler::shared(32);
    service
        .register_handler(Handler::write_only(1, first.clone()))
        .unwrap();
    service
        .register_handler(Handler::write_only(2, second.clone()))
        .unwrap();

    inject(&service, Chunk::initiating(1));
    assert!(out.last().requests_transmission());

    inject(&service, Chunk::initiating(2));
    let response = out.last();
    assert_eq!(response.transfer_id, 2);
    assert_eq!(response.status, Some(Status::ResourceExhausted));
    assert_eq!(second.lock().unwrap().prepare_calls, 0);

    // The first transfer is unaffected.
    let blob = pattern(32);
    inject(&service, data_chunk(1, 0, &blob, Some(0)));
    assert_eq!(out.last().status, Some(Status::Ok));
    assert_eq!(first.lock().unwrap().written(), blob);
}
