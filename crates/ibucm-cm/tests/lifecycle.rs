mod support;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ibucm_channel::ChannelError;
use ibucm_cm::{CmError, EventKind};
use ibucm_wire::{EventBody, Opcode, PathRecord, Presence, ReqEventParams};

use support::FakeKernel;

const BLOCKED: Duration = Duration::from_millis(150);
const DONE: Duration = Duration::from_secs(5);

#[test]
fn destroy_without_outstanding_events_returns_immediately() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);

    let id = manager.create_id(7).unwrap();
    assert_eq!(id.context(), 7);
    assert_eq!(manager.live_ids(), 1);

    manager.destroy_id(id).unwrap();
    assert_eq!(manager.live_ids(), 0);

    let destroy = kernel.last(Opcode::DestroyId).unwrap();
    assert_eq!(&destroy.payload[8..12], &100u32.to_le_bytes());
}

#[test]
fn create_tags_command_with_token() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);

    let a = manager.create_id(0).unwrap();
    let b = manager.create_id(0).unwrap();
    assert_ne!(a.handle(), b.handle());
    assert_ne!(a, b);

    let create = kernel.last(Opcode::CreateId).unwrap();
    assert_eq!(&create.payload[..8], &b.token().to_le_bytes());
}

#[test]
fn destroy_blocks_until_every_reported_event_is_released() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let id = manager.create_id(0).unwrap();

    for _ in 0..3 {
        kernel.push_status(id.handle(), EventKind::RtuReceived, 0);
    }
    let mut events: Vec<_> = (0..3).map(|_| manager.get_event().unwrap()).collect();
    assert_eq!(kernel.delivered(id.handle()), 3);

    let (tx, rx) = mpsc::channel();
    let destroyer = {
        let manager = manager.clone();
        let id = id.clone();
        thread::spawn(move || {
            manager.destroy_id(id).unwrap();
            tx.send(()).unwrap();
        })
    };

    manager.release_event(events.pop().unwrap());
    manager.release_event(events.pop().unwrap());
    assert!(rx.recv_timeout(BLOCKED).is_err(), "destroy returned early");
    assert_eq!(id.events_completed(), 2);

    manager.release_event(events.pop().unwrap());
    rx.recv_timeout(DONE).unwrap();
    destroyer.join().unwrap();
    assert_eq!(id.events_completed(), 3);
}

#[test]
fn listener_destroy_waits_for_request_events() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let listener = manager.create_id(0).unwrap();
    manager.listen(&listener, 0x1000, u64::MAX).unwrap();

    kernel.push_request(
        listener.handle(),
        EventKind::ReqReceived,
        Presence::PRIMARY,
        EventBody::Req {
            params: ReqEventParams::default(),
            primary_path: PathRecord::default(),
            alternate_path: PathRecord::default(),
        },
        None,
    );
    let event = manager.get_event().unwrap();
    let child = event.id().clone();
    assert_ne!(&child, &listener);

    let (tx, rx) = mpsc::channel();
    let destroyer = {
        let manager = manager.clone();
        let listener = listener.clone();
        thread::spawn(move || {
            manager.destroy_id(listener).unwrap();
            tx.send(()).unwrap();
        })
    };
    assert!(rx.recv_timeout(BLOCKED).is_err(), "destroy returned early");

    drop(event);
    rx.recv_timeout(DONE).unwrap();
    destroyer.join().unwrap();

    assert_eq!(child.events_completed(), 0);
    manager.destroy_id(child).unwrap();
}

#[test]
fn failed_destroy_hands_back_the_handle() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let id = manager.create_id(0).unwrap();
    let handle = id.handle();

    kernel.short_write_next(1);
    let err = manager.destroy_id(id).unwrap_err();
    assert!(matches!(
        err.source,
        CmError::Channel(ChannelError::Incomplete { written: 1, .. })
    ));

    let (id, _) = err.into_parts();
    assert_eq!(id.handle(), handle);
    assert_eq!(manager.live_ids(), 1);
    manager.destroy_id(id).unwrap();
    assert_eq!(manager.live_ids(), 0);
}

#[test]
fn failed_create_leaves_nothing_registered() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);

    kernel.short_write_next(3);
    let err = manager.create_id(0).unwrap_err();
    assert!(matches!(
        err,
        CmError::Channel(ChannelError::Incomplete {
            written: 3,
            expected: 24
        })
    ));
    assert_eq!(manager.live_ids(), 0);
}

#[test]
fn concurrent_releases_all_count() {
    const EVENTS: usize = 32;
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let id = manager.create_id(0).unwrap();

    for _ in 0..EVENTS {
        kernel.push_status(id.handle(), EventKind::DreqReceived, 0);
    }
    let mut events: Vec<_> = (0..EVENTS).map(|_| manager.get_event().unwrap()).collect();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let batch: Vec<_> = events.drain(..EVENTS / 4).collect();
        let manager = manager.clone();
        workers.push(thread::spawn(move || {
            for event in batch {
                manager.release_event(event);
            }
        }));
    }

    manager.destroy_id(id.clone()).unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(id.events_completed() as usize, EVENTS);
}
