use domain::{Event, FieldValue, Fields, Tags};
use fluxlog_pipeline::{
    BoundedQueue, ConnectionManager, FlushDaemon, FlushSettings, TickOutcome, WriteSettings,
    start,
};
use fluxlog_sink::{InMemorySink, SinkTarget};
use std::sync::Arc;
use std::time::Duration;

fn sample_event(name: &str) -> Event {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), FieldValue::String(name.to_string()));
    Event::new("daemon_test", fields, Tags::new())
}

fn names(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event.fields.get("name") {
            Some(FieldValue::String(name)) => name.clone(),
            _ => String::new(),
        })
        .collect()
}

struct Harness {
    sink: InMemorySink,
    queue: BoundedQueue,
    connection: Arc<ConnectionManager>,
    daemon: Arc<FlushDaemon>,
}

fn harness(capacity: usize, error_log_interval: Duration) -> Harness {
    let sink = InMemorySink::new();
    let queue = BoundedQueue::new(capacity);
    let connection = Arc::new(ConnectionManager::new(
        Arc::new(sink.clone()),
        SinkTarget::new("memory://local"),
        WriteSettings::default(),
    ));
    let settings = Arc::new(FlushSettings::new(
        Duration::from_millis(10),
        error_log_interval,
    ));
    let daemon = Arc::new(FlushDaemon::new(
        queue.clone(),
        connection.clone(),
        settings,
    ));
    Harness {
        sink,
        queue,
        connection,
        daemon,
    }
}

#[tokio::test]
async fn tick_ships_every_event_exactly_once() {
    let h = harness(16, Duration::from_secs(3600));
    for name in ["A", "B", "C"] {
        h.queue.enqueue(sample_event(name)).await.expect("enqueue");
    }

    let outcome = h.daemon.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Flushed {
            events: 3,
            recovered: false
        }
    );
    let batches = h.sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].database, "fluxlog");
    assert_eq!(names(&batches[0].events), vec!["A", "B", "C"]);
    assert!(h.queue.is_empty());

    assert_eq!(h.daemon.tick().await, TickOutcome::Idle);
    assert_eq!(h.sink.batches().len(), 1);
}

#[tokio::test]
async fn empty_queue_does_not_connect() {
    let h = harness(4, Duration::from_secs(3600));
    assert_eq!(h.daemon.tick().await, TickOutcome::Idle);
    assert_eq!(h.sink.connect_count(), 0);
    assert!(!h.connection.is_connected().await);
}

#[tokio::test]
async fn failed_write_requeues_batch_then_recovers() {
    let h = harness(4, Duration::from_secs(3600));
    h.queue.enqueue(sample_event("A")).await.expect("enqueue");
    h.queue.enqueue(sample_event("B")).await.expect("enqueue");

    h.sink.set_fail_write(true);
    let outcome = h.daemon.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::WriteFailed {
            requeued: 2,
            logged: true
        }
    );
    assert_eq!(h.queue.len(), 2);
    assert!(!h.connection.is_connected().await);

    h.sink.set_fail_write(false);
    let outcome = h.daemon.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Flushed {
            events: 2,
            recovered: true
        }
    );
    assert_eq!(h.queue.len(), 0);
    assert_eq!(names(&h.sink.received_events()), vec!["A", "B"]);
    assert_eq!(h.sink.connect_count(), 2);
}

#[tokio::test]
async fn requeued_events_land_behind_newer_ones() {
    let h = harness(8, Duration::from_secs(3600));
    h.queue.enqueue(sample_event("old")).await.expect("enqueue");
    h.sink.set_fail_write(true);
    h.daemon.tick().await;

    h.queue.enqueue(sample_event("new")).await.expect("enqueue");
    h.sink.set_fail_write(false);
    h.daemon.tick().await;

    assert_eq!(names(&h.sink.received_events()), vec!["old", "new"]);
}

#[tokio::test]
async fn requeue_never_exceeds_capacity() {
    let h = harness(2, Duration::from_secs(3600));
    h.queue.enqueue(sample_event("A")).await.expect("enqueue");
    h.queue.enqueue(sample_event("B")).await.expect("enqueue");
    h.sink.set_fail_write(true);
    h.daemon.tick().await;

    let producer = {
        let queue = h.queue.clone();
        tokio::spawn(async move { queue.enqueue(sample_event("C")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!producer.is_finished());
    assert_eq!(h.queue.len(), 2);

    h.sink.set_fail_write(false);
    h.daemon.tick().await;
    producer.await.expect("join").expect("enqueue");
    h.daemon.tick().await;
    assert_eq!(names(&h.sink.received_events()), vec!["A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn failure_logging_is_throttled_per_interval() {
    let h = harness(4, Duration::from_secs(3600));
    h.queue.enqueue(sample_event("A")).await.expect("enqueue");
    h.sink.set_fail_connect(true);

    let mut logged = 0;
    for _ in 0..5 {
        match h.daemon.tick().await {
            TickOutcome::ConnectFailed { logged: true } => logged += 1,
            TickOutcome::ConnectFailed { logged: false } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        tokio::time::advance(Duration::from_secs(60)).await;
    }
    assert_eq!(logged, 1);
    assert_eq!(h.queue.len(), 1);

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(
        h.daemon.tick().await,
        TickOutcome::ConnectFailed { logged: true }
    );

    h.sink.set_fail_connect(false);
    assert_eq!(
        h.daemon.tick().await,
        TickOutcome::Flushed {
            events: 1,
            recovered: true
        }
    );
    h.queue.enqueue(sample_event("B")).await.expect("enqueue");
    assert_eq!(
        h.daemon.tick().await,
        TickOutcome::Flushed {
            events: 1,
            recovered: false
        }
    );
}

#[tokio::test]
async fn missing_address_fails_without_draining() {
    let h = harness(4, Duration::from_secs(3600));
    h.connection.set_address("");
    h.queue.enqueue(sample_event("A")).await.expect("enqueue");

    assert_eq!(
        h.daemon.tick().await,
        TickOutcome::ConnectFailed { logged: true }
    );
    assert_eq!(h.queue.len(), 1);
    assert_eq!(h.sink.connect_count(), 0);
}

#[tokio::test]
async fn started_daemon_flushes_on_interval_and_on_shutdown() {
    let h = harness(16, Duration::from_secs(3600));
    let handle = start(h.daemon.clone());

    h.queue.enqueue(sample_event("A")).await.expect("enqueue");
    for _ in 0..100 {
        if !h.sink.batches().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(names(&h.sink.received_events()), vec!["A"]);

    h.daemon.settings().set_flush_interval(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.queue.enqueue(sample_event("B")).await.expect("enqueue");
    handle.shutdown().await.expect("shutdown");
    assert_eq!(names(&h.sink.received_events()), vec!["A", "B"]);
}
