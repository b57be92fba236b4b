//! End-to-end streaming through the result store
//!
//! Writer and reader run on separate threads, the way the engine and the
//! response pipeline do.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use streamgate::{
    BufferKind, EventAcceptor, EventRouter, GatewayError, OperationId, RecordingNotifier,
    ResultStore, Status,
};
use tempfile::TempDir;

fn open_store(kind: BufferKind, capacity: usize) -> (TempDir, ResultStore) {
    let base = TempDir::new().unwrap();
    let store = ResultStore::new(kind, base.path(), capacity).unwrap();
    (base, store)
}

/// Write `chunks` on a writer thread, read everything on this one
fn stream_through(kind: BufferKind, chunks: Vec<Vec<u8>>, read_size: usize) -> Vec<u8> {
    let (_base, store) = open_store(kind, 32);
    let id = OperationId::new("stream");
    let handler = store.new_handler_for(id.clone(), "application/octet-stream").unwrap();
    let mut result = store.obtain_readable_result(&id).unwrap();

    let mut sink = handler.into_sink();
    let producer = thread::spawn(move || {
        for chunk in chunks {
            sink.write_all(&chunk).unwrap();
        }
        sink.close().unwrap();
    });

    let mut out = Vec::new();
    let mut buf = vec![0u8; read_size];
    loop {
        let n = result.source.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    producer.join().unwrap();
    out
}

// ═══════════════════════════════════════════════════════════════
// Ordering and EOF
// ═══════════════════════════════════════════════════════════════

#[test]
fn file_buffer_delivers_all_bytes_in_order() {
    let chunks: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i; (i as usize % 7) + 1]).collect();
    let expected: Vec<u8> = chunks.concat();
    assert_eq!(stream_through(BufferKind::File, chunks, 13), expected);
}

#[test]
fn memory_buffer_delivers_all_bytes_in_order() {
    let chunks: Vec<Vec<u8>> = (0..100u8).map(|i| vec![i; (i as usize % 50) + 1]).collect();
    let expected: Vec<u8> = chunks.concat();
    assert_eq!(stream_through(BufferKind::Memory, chunks, 100), expected);
}

#[test]
fn short_result_is_short_read_then_eof() {
    for kind in [BufferKind::File, BufferKind::Memory] {
        let (_base, store) = open_store(kind, 16);
        let id = OperationId::new("abc");
        let mut handler = store.new_handler_for(id.clone(), "text/plain").unwrap();
        handler.sink.write_all(b"abc").unwrap();
        handler.into_sink().close().unwrap();

        let mut result = store.obtain_readable_result(&id).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(result.source.read(&mut buf).unwrap(), 3, "{kind}");
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(result.source.read(&mut buf).unwrap(), 0, "{kind}");
    }
}

#[test]
fn slow_writer_does_not_starve_reader() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let id = OperationId::new("slow");
    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    let mut result = store.obtain_readable_result(&id).unwrap();

    let producer = thread::spawn(move || {
        for word in ["one ", "two ", "three"] {
            thread::sleep(Duration::from_millis(20));
            sink.write_all(word.as_bytes()).unwrap();
        }
    });

    let mut out = String::new();
    result.source.read_to_string(&mut out).unwrap();
    producer.join().unwrap();
    assert_eq!(out, "one two three");
}

#[test]
fn failed_writer_still_lets_reader_drain() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let id = OperationId::new("crash");
    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    let mut result = store.obtain_readable_result(&id).unwrap();

    let producer = thread::spawn(move || {
        sink.write_all(b"partial row").unwrap();
        panic!("engine crashed mid-stream");
    });
    assert!(producer.join().is_err());

    let mut out = Vec::new();
    result.source.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"partial row");
}

// ═══════════════════════════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════════════════════════

#[test]
fn client_disconnect_reaches_acceptor_as_cause() {
    let (_base, store) = open_store(BufferKind::Memory, 8);
    let recorder = RecordingNotifier::new();
    let router = Arc::new(EventRouter::new());
    let id = OperationId::new("disconnect");
    router
        .track(EventAcceptor::new(id.clone(), recorder.clone()))
        .unwrap();

    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    let result = store.obtain_readable_result(&id).unwrap();

    let engine = {
        let router = Arc::clone(&router);
        let id = id.clone();
        thread::spawn(move || {
            let outcome = (0..1000).try_for_each(|_| sink.write_all(b"row\n"));
            if let Err(e) = outcome {
                router.on_cause(&id, GatewayError::engine(e));
                router.on_status(&id, Status::Error);
            } else {
                router.on_status(&id, Status::Completed);
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    drop(result);
    engine.join().unwrap();

    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.successes(), 0);
    assert!(!router.is_tracked(&id));
}

#[test]
fn file_reader_abort_fails_writer() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let id = OperationId::new("abort");
    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    drop(store.obtain_readable_result(&id).unwrap());

    let accepted = (0..1000)
        .take_while(|_| sink.write_all(b"row\n").is_ok())
        .count();
    assert_eq!(accepted, 0);
    let err = sink.write_all(b"row\n").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

#[test]
fn file_dispose_unblocks_blocked_reader() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let id = OperationId::new("blocked");
    let _sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    let mut result = store.obtain_readable_result(&id).unwrap();

    let reader = thread::spawn(move || result.source.read(&mut [0u8; 16]));
    thread::sleep(Duration::from_millis(50));
    assert!(store.release(&id).unwrap());

    assert!(matches!(reader.join().unwrap(), Ok(0)));
}

// ═══════════════════════════════════════════════════════════════
// Disposal
// ═══════════════════════════════════════════════════════════════

#[test]
fn dispose_all_removes_buffers_and_results() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let ids: Vec<OperationId> = (0..3).map(|i| OperationId::new(format!("op-{i}"))).collect();
    for id in &ids {
        let mut handler = store.new_handler_for(id.clone(), "text/plain").unwrap();
        handler.sink.write_all(b"data").unwrap();
    }
    store.release(&ids[0]).unwrap();

    store.dispose_all().unwrap();
    assert!(!store.root().exists());
    for id in &ids {
        let err = store.obtain_readable_result(id).unwrap_err();
        assert!(matches!(err, GatewayError::ResultNotFound { .. }));
    }
}

#[test]
fn stop_hook_releases_result() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let store = Arc::new(store);
    let hook_store = Arc::clone(&store);
    let router = EventRouter::new().with_stop_hook(move |id| {
        hook_store.release(id).unwrap();
    });
    let id = OperationId::new("hooked");
    router
        .track(EventAcceptor::new(id.clone(), RecordingNotifier::new()))
        .unwrap();

    store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink().close().unwrap();
    assert_eq!(store.len(), 1);

    router.on_status(&id, Status::Completed);
    assert!(store.is_empty());
    assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
}

#[test]
fn reader_opened_after_finalization_reads_everything() {
    let (_base, store) = open_store(BufferKind::File, 16);
    let id = OperationId::new("late-reader");
    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    sink.write_all(b"complete result").unwrap();
    sink.close().unwrap();

    let mut out = Vec::new();
    store
        .obtain_readable_result(&id)
        .unwrap()
        .source
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, b"complete result");
}

#[test]
fn broken_pipe_is_reported_as_io_error() {
    let (_base, store) = open_store(BufferKind::Memory, 4);
    let id = OperationId::new("pipe");
    let mut sink = store.new_handler_for(id.clone(), "text/plain").unwrap().into_sink();
    drop(store.obtain_readable_result(&id).unwrap());
    let err = sink.write_all(b"x").unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}

// ═══════════════════════════════════════════════════════════════
// Property: any write sequence arrives intact
// ═══════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_write_sequence_arrives_intact(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..24),
        read_size in 1usize..97,
        memory in any::<bool>(),
    ) {
        let kind = if memory { BufferKind::Memory } else { BufferKind::File };
        let expected: Vec<u8> = chunks.concat();
        prop_assert_eq!(stream_through(kind, chunks, read_size), expected);
    }
}
