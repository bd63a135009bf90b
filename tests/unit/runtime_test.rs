//! Tests for tokio spawner utilities

use std::time::{Duration, SystemTime};

use temporal_policy::config::SchedulerConfig;
use temporal_policy::core::{EventKind, EventScheduler};
use temporal_policy::runtime::{Spawn, TokioSpawner};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handoff_runs_async_handler() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let callback = spawner.handoff(move |kind| {
        let tx = tx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(kind);
        }
    });

    let scheduler = EventScheduler::new(SchedulerConfig::default());
    scheduler.start().unwrap();
    scheduler
        .add_event(
            "sym1",
            EventKind::CloseProhibit,
            SystemTime::now() + Duration::from_secs(3600),
            Duration::from_secs(60),
            Some(callback),
        )
        .unwrap();
    // Runs on the loop thread's join, which is blocking.
    tokio::task::block_in_place(|| scheduler.stop());

    let kind = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(kind, Some(EventKind::CloseProhibit));
}
