//! End-to-end transfers: a real client and service joined by in-memory
//! queues, with frames pumped between them until the channel goes quiet.

use ferry_client::Client;
use ferry_core::config::TransferConfig;
use ferry_core::handler::Handler;
use ferry_core::protocol::Status;
use ferry_core::stream::MemoryReader;
use ferry_core::transport::StreamDirection;
use ferry_server::TransferService;
use ferry_test_utils::{
    pattern, ChunkQueue, QueueTransport, SharedWriter, StatusProbe, TestReadHandler,
    TestWriteHandler,
};

struct Channel {
    client: Client,
    service: TransferService,
    client_read: ChunkQueue,
    client_write: ChunkQueue,
    server_read: ChunkQueue,
    server_write: ChunkQueue,
}

impl Channel {
    fn new(client_config: TransferConfig, server_config: TransferConfig) -> Self {
        let (client_transport, client_read, client_write) = QueueTransport::new();
        let (server_transport, server_read, server_write) = QueueTransport::new();
        Self {
            client: Client::new(client_config, client_transport),
            service: TransferService::new(server_config, server_transport),
            client_read,
            client_write,
            server_read,
            server_write,
        }
    }

    /// Ferry frames back and forth until neither side has anything queued.
    fn pump(&self) {
        loop {
            let mut moved = false;
            for frame in self.client_read.drain_new() {
                self.service
                    .process_chunk(StreamDirection::Read, &frame)
                    .unwrap();
                moved = true;
            }
            for frame in self.client_write.drain_new() {
                self.service
                    .process_chunk(StreamDirection::Write, &frame)
                    .unwrap();
                moved = true;
            }
            for frame in self.server_read.drain_new() {
                self.client
                    .process_chunk(StreamDirection::Read, &frame)
                    .unwrap();
                moved = true;
            }
            for frame in self.server_write.drain_new() {
                self.client
                    .process_chunk(StreamDirection::Write, &frame)
                    .unwrap();
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }
}

fn small_chunks() -> TransferConfig {
    TransferConfig::default()
        .with_max_pending_bytes(128)
        .with_max_chunk_size_bytes(64)
}

#[test]
fn read_round_trip() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let blob = pattern(256);
    let handler = TestReadHandler::shared(blob.clone());
    channel
        .service
        .register_handler(Handler::read_only(3, handler.clone()))
        .unwrap();

    let writer = SharedWriter::with_capacity(512);
    let probe = StatusProbe::new();
    channel.client.read(3, writer.boxed(), probe.callback()).unwrap();
    channel.pump();

    assert_eq!(probe.get(), Some(Status::Ok));
    assert_eq!(writer.written(), blob);
    let handler = handler.lock().unwrap();
    assert_eq!(handler.prepare_calls, 1);
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
}

#[test]
fn write_round_trip() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let blob = pattern(200);
    let handler = TestWriteHandler::shared(512);
    channel
        .service
        .register_handler(Handler::write_only(7, handler.clone()))
        .unwrap();

    let probe = StatusProbe::new();
    channel
        .client
        .write(7, Box::new(MemoryReader::new(blob.clone())), probe.callback())
        .unwrap();
    channel.pump();

    assert_eq!(probe.get(), Some(Status::Ok));
    let handler = handler.lock().unwrap();
    assert_eq!(handler.written(), blob);
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Ok));
}

#[test]
fn empty_blob_write() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let handler = TestWriteHandler::shared(64);
    channel
        .service
        .register_handler(Handler::write_only(9, handler.clone()))
        .unwrap();

    let probe = StatusProbe::new();
    channel
        .client
        .write(9, Box::new(MemoryReader::new(Vec::new())), probe.callback())
        .unwrap();
    channel.pump();

    assert_eq!(probe.get(), Some(Status::Ok));
    let handler = handler.lock().unwrap();
    assert!(handler.written().is_empty());
    assert_eq!(handler.finalize_status, Some(Status::Ok));
}

#[test]
fn sequential_transfers_reuse_the_slot() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let blob_a = pattern(100);
    let blob_b: Vec<u8> = pattern(80).iter().map(|b| b ^ 0xFF).collect();

    let handler_a = TestWriteHandler::shared(128);
    let handler_b = TestWriteHandler::shared(128);
    channel
        .service
        .register_handler(Handler::write_only(1, handler_a.clone()))
        .unwrap();
    channel
        .service
        .register_handler(Handler::write_only(2, handler_b.clone()))
        .unwrap();

    let probe_a = StatusProbe::new();
    channel
        .client
        .write(1, Box::new(MemoryReader::new(blob_a.clone())), probe_a.callback())
        .unwrap();
    channel.pump();
    assert_eq!(probe_a.get(), Some(Status::Ok));

    let probe_b = StatusProbe::new();
    channel
        .client
        .write(2, Box::new(MemoryReader::new(blob_b.clone())), probe_b.callback())
        .unwrap();
    channel.pump();
    assert_eq!(probe_b.get(), Some(Status::Ok));

    assert_eq!(handler_a.lock().unwrap().written(), blob_a);
    assert_eq!(handler_b.lock().unwrap().written(), blob_b);
}

#[test]
fn server_context_exhaustion_rejects_one_of_two() {
    // The client can hold two transfers, the service only one.
    let channel = Channel::new(
        small_chunks().with_transfer_contexts(2),
        small_chunks().with_transfer_contexts(1),
    );
    let handler_a = TestWriteHandler::shared(128);
    let handler_b = TestWriteHandler::shared(128);
    channel
        .service
        .register_handler(Handler::write_only(1, handler_a.clone()))
        .unwrap();
    channel
        .service
        .register_handler(Handler::write_only(2, handler_b.clone()))
        .unwrap();

    let blob = pattern(64);
    let probe_a = StatusProbe::new();
    let probe_b = StatusProbe::new();
    channel
        .client
        .write(1, Box::new(MemoryReader::new(blob.clone())), probe_a.callback())
        .unwrap();
    channel
        .client
        .write(2, Box::new(MemoryReader::new(blob.clone())), probe_b.callback())
        .unwrap();
    channel.pump();

    // The first transfer lands; the second is turned away.
    assert_eq!(probe_a.get(), Some(Status::Ok));
    assert_eq!(probe_b.get(), Some(Status::ResourceExhausted));
    assert_eq!(handler_a.lock().unwrap().written(), blob);
    assert_eq!(handler_b.lock().unwrap().prepare_calls, 0);
}

#[test]
fn read_not_found_reaches_the_callback() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let probe = StatusProbe::new();
    channel
        .client
        .read(42, SharedWriter::with_capacity(64).boxed(), probe.callback())
        .unwrap();
    channel.pump();

    assert_eq!(probe.get(), Some(Status::NotFound));
}

#[test]
fn cancel_reaches_the_service() {
    let channel = Channel::new(small_chunks(), small_chunks());
    let handler = TestWriteHandler::shared(1024);
    channel
        .service
        .register_handler(Handler::write_only(5, handler.clone()))
        .unwrap();

    let probe = StatusProbe::new();
    channel
        .client
        .write(5, Box::new(MemoryReader::new(pattern(8))), probe.callback())
        .unwrap();
    // Deliver only the initiation, then cancel before any grant arrives.
    for frame in channel.client_write.drain_new() {
        channel
            .service
            .process_chunk(StreamDirection::Write, &frame)
            .unwrap();
    }
    channel.client.cancel(5).unwrap();
    channel.pump();

    assert_eq!(probe.get(), Some(Status::Cancelled));
    let handler = handler.lock().unwrap();
    assert_eq!(handler.finalize_calls, 1);
    assert_eq!(handler.finalize_status, Some(Status::Cancelled));
}

#[test]
fn both_directions_share_the_channel() {
    let channel = Channel::new(
        small_chunks().with_transfer_contexts(2),
        small_chunks().with_transfer_contexts(2),
    );
    let blob_out = pattern(96);
    let blob_in = pattern(64);

    let write_handler = TestWriteHandler::shared(128);
    let read_handler = TestReadHandler::shared(blob_in.clone());
    channel
        .service
        .register_handler(Handler::write_only(1, write_handler.clone()))
        .unwrap();
    channel
        .service
        .register_handler(Handler::read_only(2, read_handler))
        .unwrap();

    let probe_write = StatusProbe::new();
    let probe_read = StatusProbe::new();
    let writer = SharedWriter::with_capacity(128);
    channel
        .client
        .write(
            1,
            Box::new(MemoryReader::new(blob_out.clone())),
            probe_write.callback(),
        )
        .unwrap();
    channel
        .client
        .read(2, writer.boxed(), probe_read.callback())
        .unwrap();
    channel.pump();

    assert_eq!(probe_write.get(), Some(Status::Ok));
    assert_eq!(probe_read.get(), Some(Status::Ok));
    assert_eq!(write_handler.lock().unwrap().written(), blob_out);
    assert_eq!(writer.written(), blob_in);
}
