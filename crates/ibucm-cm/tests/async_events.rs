#![cfg(feature = "async")]

mod support;

use std::time::Duration;

use ibucm_channel::ChannelError;
use ibucm_cm::{AsyncEvents, CmError, EventKind};

use support::FakeKernel;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_event_waits_across_poll_intervals() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let id = manager.create_id(0).unwrap();

    let events = AsyncEvents::new(manager.clone()).with_poll_interval(Duration::from_millis(10));
    let handle = id.handle();
    let pusher = {
        let kernel = kernel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            kernel.push_status(handle, EventKind::RtuReceived, 0);
        })
    };

    let event = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("event within deadline")
        .unwrap();
    assert_eq!(event.kind(), EventKind::RtuReceived);
    assert_eq!(event.id(), &id);
    pusher.await.unwrap();

    drop(event);
    manager.destroy_id(id).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_event_surfaces_channel_fault() {
    let kernel = FakeKernel::new();
    let manager = FakeKernel::manager(&kernel);
    let events = AsyncEvents::new(manager).with_poll_interval(Duration::from_millis(10));

    kernel.hang_up();
    let err = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("fault within deadline")
        .unwrap_err();
    assert!(matches!(err, CmError::Channel(ChannelError::Io(_))));
}
