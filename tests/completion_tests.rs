//! Exactly-once completion under racing status and cause events

use std::io;
use std::sync::{Arc, Barrier};
use std::thread;

use streamgate::completion::{ErrorState, Notification};
use streamgate::{
    ErrorKind, EventAcceptor, EventRouter, GatewayError, OperationId, RecordingNotifier, Status,
};

fn disk_full() -> GatewayError {
    GatewayError::engine(io::Error::new(io::ErrorKind::Other, "disk full"))
}

fn acceptor() -> (Arc<EventAcceptor>, RecordingNotifier) {
    let recorder = RecordingNotifier::new();
    let acceptor = EventAcceptor::new(OperationId::new("op"), recorder.clone());
    (Arc::new(acceptor), recorder)
}

fn assert_single_disk_full(recorder: &RecordingNotifier) {
    let received = recorder.take();
    assert_eq!(received.len(), 1, "expected exactly one notification");
    match &received[0] {
        Notification::Failed(cause) => assert!(cause.to_string().contains("disk full")),
        Notification::Succeeded => panic!("expected failure, got success"),
    }
}

#[test]
fn cause_before_status() {
    let (subject, recorder) = acceptor();
    let first = subject.on_cause(disk_full());
    let second = subject.on_status(Status::Error);

    assert!(!first);
    assert!(second);
    assert_single_disk_full(&recorder);
}

#[test]
fn status_before_cause() {
    let (subject, recorder) = acceptor();
    let first = subject.on_status(Status::Error);
    let second = subject.on_cause(disk_full());

    assert!(!first);
    assert!(second);
    assert_single_disk_full(&recorder);
}

#[test]
fn simultaneous_status_and_cause() {
    for _ in 0..500 {
        let (subject, recorder) = acceptor();
        let barrier = Arc::new(Barrier::new(2));

        let status = {
            let subject = Arc::clone(&subject);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                subject.on_status(Status::Error)
            })
        };
        let cause = {
            let subject = Arc::clone(&subject);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                subject.on_cause(disk_full())
            })
        };

        let stops = [status.join().unwrap(), cause.join().unwrap()];
        assert_eq!(
            stops.iter().filter(|s| **s).count(),
            1,
            "exactly one event must signal stop"
        );
        assert_eq!(subject.error_state(), ErrorState::HasPublishedErrors);
        assert_single_disk_full(&recorder);
    }
}

#[test]
fn completion_is_final_despite_duplicates() {
    let (subject, recorder) = acceptor();
    assert!(subject.on_status(Status::Completed));
    subject.on_status(Status::Completed);
    subject.on_status(Status::Terminated);
    subject.on_cause(disk_full());

    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.successes(), 1);
}

#[test]
fn termination_is_distinguishable_from_failure() {
    let (subject, recorder) = acceptor();
    assert!(subject.on_status(Status::Terminated));
    assert_eq!(recorder.failure_kinds(), vec![ErrorKind::Terminated]);
}

#[test]
fn router_stops_exactly_once_under_concurrent_delivery() {
    for round in 0..200 {
        let stops = Arc::new(parking_lot::Mutex::new(0usize));
        let hook_stops = Arc::clone(&stops);
        let router = Arc::new(EventRouter::new().with_stop_hook(move |_| *hook_stops.lock() += 1));
        let recorder = RecordingNotifier::new();
        let id = OperationId::new(format!("op-{round}"));
        router
            .track(EventAcceptor::new(id.clone(), recorder.clone()))
            .unwrap();

        let barrier = Arc::new(Barrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let router = Arc::clone(&router);
                let barrier = Arc::clone(&barrier);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    match i {
                        0 => router.on_status(&id, Status::Error),
                        1 => router.on_cause(&id, disk_full()),
                        _ => router.on_status(&id, Status::Error),
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*stops.lock(), 1);
        assert!(!router.is_tracked(&id));
        assert_single_disk_full(&recorder);
    }
}
