use domain::{FieldValue, Fields, Precision, Tags};
use fluxlog_config::FluxlogConfig;
use fluxlog_engine::{Backpressure, EnqueueOutcome, Fluxlog, PipelineError, TickOutcome};
use fluxlog_sink::InMemorySink;
use std::sync::Arc;
use std::time::Duration;

fn config() -> FluxlogConfig {
    FluxlogConfig {
        address: Some("memory://local".to_string()),
        flush_interval: Duration::from_millis(10),
        ..FluxlogConfig::default()
    }
}

fn engine(sink: &InMemorySink, config: &FluxlogConfig) -> Fluxlog {
    Fluxlog::new(Arc::new(sink.clone()), config)
}

fn fields(id: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("id".to_string(), FieldValue::I64(id));
    fields
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[tokio::test]
async fn write_then_flush_ships_enriched_event() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.set_global_tags(tags(&[("env", "prod"), ("host", "a")]));

    let outcome = engine
        .write("test_write", fields(42), tags(&[("env", "test")]))
        .await
        .expect("write");
    assert_eq!(outcome, EnqueueOutcome::Queued);
    assert_eq!(engine.queue_len(), 1);

    assert_eq!(
        engine.flush_now().await,
        TickOutcome::Flushed {
            events: 1,
            recovered: false
        }
    );
    let events = sink.received_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].measurement, "test_write");
    assert_eq!(events[0].tags, tags(&[("env", "test"), ("host", "a")]));
    assert_eq!(events[0].fields.get("id"), Some(&FieldValue::I64(42)));
}

#[tokio::test]
async fn whitelist_rejects_before_enqueue() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.add_measurement_to_whitelist("test_write_03");

    let err = engine
        .write("test_write_02", fields(1), Tags::new())
        .await
        .expect_err("not whitelisted");
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(engine.queue_len(), 0);

    engine
        .write("test_write_03", fields(2), Tags::new())
        .await
        .expect("whitelisted");
    assert_eq!(engine.queue_len(), 1);
}

#[tokio::test]
async fn invalid_event_is_rejected() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());

    let err = engine
        .write("empty", Fields::new(), Tags::new())
        .await
        .expect_err("empty fields");
    assert!(matches!(err, PipelineError::Validation(_)));

    let mut nan = Fields::new();
    nan.insert("value".to_string(), FieldValue::F64(f64::NAN));
    assert!(engine.write("nan", nan, Tags::new()).await.is_err());
    assert_eq!(engine.queue_len(), 0);
}

#[tokio::test]
async fn metadata_points_at_write_call_site() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.set_save_metadata(true);

    engine
        .write("with_meta", fields(1), Tags::new())
        .await
        .expect("write");
    engine.flush_now().await;

    let events = sink.received_events();
    assert_eq!(
        events[0].fields.get("file"),
        Some(&FieldValue::String("engine.rs".to_string()))
    );
}

#[tokio::test]
async fn run_command_flushes_pending_events_first() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine
        .write("before_query", fields(1), Tags::new())
        .await
        .expect("write");

    engine
        .run_command("SELECT * FROM before_query")
        .await
        .expect("command");
    assert_eq!(sink.received_events().len(), 1);
    assert_eq!(
        sink.commands(),
        vec![(
            "fluxlog".to_string(),
            "SELECT * FROM before_query".to_string()
        )]
    );
}

#[tokio::test]
async fn settings_flow_into_next_batch() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.set_precision(Precision::Seconds);
    engine.set_retention_policy("week");
    engine.change_database("metrics").await.expect("change");

    engine.write("m", fields(1), Tags::new()).await.expect("write");
    engine.flush_now().await;

    let batches = sink.batches();
    assert_eq!(batches[0].database, "metrics");
    assert_eq!(batches[0].precision, Precision::Seconds);
    assert_eq!(batches[0].retention_policy.as_deref(), Some("week"));

    engine.set_retention_policy("");
    assert_eq!(engine.write_settings().retention_policy, None);
}

#[tokio::test]
async fn async_overflow_defers_when_full() {
    let sink = InMemorySink::new();
    let engine = engine(
        &sink,
        &FluxlogConfig {
            queue_capacity: 1,
            async_overflow: true,
            ..config()
        },
    );
    assert_eq!(engine.backpressure(), Backpressure::AsyncOverflow);

    let first = engine.write("m", fields(1), Tags::new()).await.expect("first");
    let second = engine.write("m", fields(2), Tags::new()).await.expect("second");
    assert_eq!(first, EnqueueOutcome::Queued);
    assert_eq!(second, EnqueueOutcome::Deferred);
    assert_eq!(engine.queue_len(), 1);
    assert_eq!(engine.pending_overflow(), 1);

    engine.flush_now().await;
    for _ in 0..100 {
        if engine.pending_overflow() == 0 && engine.queue_len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    engine.flush_now().await;
    assert_eq!(sink.received_events().len(), 2);

    engine.set_async_overflow(false);
    assert_eq!(engine.backpressure(), Backpressure::Block);
}

#[tokio::test]
async fn shutdown_flushes_remaining_events() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.set_flush_interval(Duration::from_secs(3600));
    let handle = engine.start();

    engine.write("m", fields(1), Tags::new()).await.expect("write");
    engine.close();
    handle.shutdown().await.expect("shutdown");

    assert_eq!(sink.received_events().len(), 1);
    let err = engine
        .write("m", fields(2), Tags::new())
        .await
        .expect_err("closed");
    assert!(matches!(err, PipelineError::QueueClosed));
}

#[tokio::test]
async fn missing_address_keeps_events_queued() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &FluxlogConfig::default());

    engine.write("m", fields(1), Tags::new()).await.expect("write");
    assert_eq!(
        engine.flush_now().await,
        TickOutcome::ConnectFailed { logged: true }
    );
    assert_eq!(engine.queue_len(), 1);

    engine.set_address("memory://late");
    assert!(matches!(
        engine.flush_now().await,
        TickOutcome::Flushed { events: 1, .. }
    ));
    assert_eq!(engine.target().address, "memory://late");
}

#[tokio::test]
async fn writef_needs_a_value_per_placeholder() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.set_save_metadata(true);
    let measurement = "failed to do thing with id %d";

    let err = engine
        .writef(measurement, &[])
        .await
        .expect_err("insufficient values");
    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(engine.queue_len(), 0);

    engine
        .writef(measurement, &[FieldValue::I64(42)])
        .await
        .expect("writef");
    engine.flush_now().await;

    let events = sink.received_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].measurement, measurement);
    assert_eq!(events[0].fields.get("d1"), Some(&FieldValue::I64(42)));
    assert_eq!(
        events[0].fields.get("file"),
        Some(&FieldValue::String("engine.rs".to_string()))
    );
}

#[tokio::test]
async fn writef_counts_each_placeholder_kind() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());

    engine
        .writef(
            "copied %d of %d files to %s (%+v)",
            &[
                FieldValue::I64(1),
                FieldValue::I64(3),
                FieldValue::from("/tmp"),
                FieldValue::Bool(true),
                FieldValue::from("extra"),
            ],
        )
        .await
        .expect("writef");
    engine.flush_now().await;

    let events = sink.received_events();
    let expected: Fields = [
        ("d1", FieldValue::I64(1)),
        ("d2", FieldValue::I64(3)),
        ("s1", FieldValue::String("/tmp".to_string())),
        ("+v1", FieldValue::Bool(true)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();
    assert_eq!(events[0].fields, expected);
}

#[tokio::test]
async fn writef_respects_whitelist() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());
    engine.add_measurement_to_whitelist("allowed %d");

    let err = engine
        .writef("denied %d", &[FieldValue::I64(1)])
        .await
        .expect_err("not whitelisted");
    assert!(matches!(err, PipelineError::Validation(_)));
    engine
        .writef("allowed %d", &[FieldValue::I64(1)])
        .await
        .expect("whitelisted");
    assert_eq!(engine.queue_len(), 1);
}

#[tokio::test]
async fn unencodable_tags_never_reach_the_queue() {
    let sink = InMemorySink::new();
    let engine = engine(&sink, &config());

    for value in ["/a\nb", "C:\\"] {
        let err = engine
            .write("m", fields(1), tags(&[("uri", value)]))
            .await
            .expect_err("unencodable tag");
        assert!(matches!(err, PipelineError::Validation(_)));
    }
    assert_eq!(engine.queue_len(), 0);

    engine
        .write("m", fields(2), tags(&[("uri", "/a")]))
        .await
        .expect("write");
    assert!(matches!(
        engine.flush_now().await,
        TickOutcome::Flushed { events: 1, .. }
    ));
}
