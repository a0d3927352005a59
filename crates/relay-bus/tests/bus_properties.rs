//! Invariant-style tests: result identity, hook-before-handler ordering,
//! per-producer FIFO, registry round-trips, scope isolation, the metrics
//! accounting identity, timeouts and cancellation.

use parking_lot::Mutex;
use relay_bus::testing::{CountingEventHandler, RecordingHook};
use relay_bus::{
    Bus, BusConfig, ErrorKind, EventTypeFilter, HandlerError, HandlerScope, OverflowPolicy,
    ValidationMiddleware,
};
use relay_message::{Command, Event};
use relay_types::SessionId;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn started_bus(config: BusConfig) -> Bus {
    let bus = Bus::new(config).expect("valid config");
    bus.start().await;
    bus
}

#[tokio::test]
async fn every_command_yields_exactly_one_result_with_matching_id() {
    let bus = started_bus(BusConfig::default()).await;
    bus.register_command_handler(
        "Echo",
        |command: Command| async move { Ok::<Value, HandlerError>(command.payload) },
        HandlerScope::Bus,
    )
    .unwrap();

    for n in 0..20 {
        let command = Command::new("Echo", json!(n));
        let command_id = command.command_id;
        let result = bus.execute(command).await;
        assert_eq!(result.command_id, command_id);
        assert!(result.success);
    }

    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("commands_sent_total"), 20);
    assert_eq!(snapshot.counter("commands_processed_total"), 20);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn hook_observes_event_before_any_handler() {
    let bus = started_bus(BusConfig::default()).await;
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let log = log.clone();
        bus.set_observability_hook(move |_event: &Event| {
            log.lock().push("hook");
        });
    }
    {
        let log = log.clone();
        bus.register_event_handler(
            "tick",
            move |_event: Event| {
                let log = log.clone();
                async move {
                    log.lock().push("handler");
                    Ok(())
                }
            },
            HandlerScope::Bus,
        )
        .unwrap();
    }

    assert!(bus.publish(Event::new("tick", Value::Null)).is_accepted());
    bus.wait_until_idle().await;

    assert_eq!(*log.lock(), vec!["hook", "handler"]);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn single_producer_fifo_at_equal_priority() {
    let bus = started_bus(BusConfig::default()).await;
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let seen = seen.clone();
        bus.register_event_handler(
            "seq",
            move |event: Event| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(event.payload.as_i64().unwrap());
                    Ok(())
                }
            },
            HandlerScope::Bus,
        )
        .unwrap();
    }

    for n in 0..50 {
        assert!(bus.publish(Event::new("seq", json!(n))).is_accepted());
    }
    bus.wait_until_idle().await;

    let seen = seen.lock().clone();
    assert_eq!(seen, (0..50).collect::<Vec<i64>>());

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn register_unregister_roundtrip_is_invisible() {
    let bus = started_bus(BusConfig::default()).await;
    let counter = CountingEventHandler::new();

    let baseline = bus.metrics_snapshot().gauge("registered_handlers");
    let key = bus
        .register_event_handler("tick", counter.clone(), HandlerScope::Bus)
        .unwrap();
    bus.unregister(&key);
    assert_eq!(
        bus.metrics_snapshot().gauge("registered_handlers"),
        baseline
    );

    bus.publish(Event::new("tick", Value::Null));
    bus.wait_until_idle().await;
    assert_eq!(counter.hits(), 0);

    // A command handler can be registered again after removal, as if the
    // first registration never happened.
    let key = bus
        .register_command_handler(
            "Ping",
            |_c: Command| async move { Ok::<Value, HandlerError>(Value::Null) },
            HandlerScope::Bus,
        )
        .unwrap();
    bus.unregister(&key);
    bus.register_command_handler(
        "Ping",
        |_c: Command| async move { Ok::<Value, HandlerError>(Value::Null) },
        HandlerScope::Bus,
    )
    .unwrap();

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn session_scoped_handlers_only_see_their_session() {
    let bus = started_bus(BusConfig::default()).await;

    let session = bus.open_session(Some(SessionId::named("mine"))).unwrap();
    let scoped = CountingEventHandler::new();
    session.register_event_handler("tick", scoped.clone()).unwrap();

    let global = CountingEventHandler::new();
    bus.register_event_handler("tick", global.clone(), HandlerScope::Bus)
        .unwrap();

    session.publish(Event::new("tick", Value::Null));
    bus.publish(Event::new("tick", Value::Null).with_session(SessionId::named("other")));
    bus.publish(Event::new("tick", Value::Null));
    bus.wait_until_idle().await;

    // The session handler saw only its own session's event; the
    // bus-scoped handler saw all three.
    assert_eq!(scoped.hits(), 1);
    assert_eq!(global.hits(), 3);

    session.close();
    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn command_resolution_prefers_session_then_bus() {
    let bus = started_bus(BusConfig::default()).await;

    bus.register_command_handler(
        "Who",
        |_c: Command| async move { Ok::<Value, HandlerError>(json!("bus")) },
        HandlerScope::Bus,
    )
    .unwrap();
    bus.register_command_handler(
        "Who",
        |_c: Command| async move { Ok::<Value, HandlerError>(json!("session")) },
        HandlerScope::Session(SessionId::named("mine")),
    )
    .unwrap();

    let result = bus
        .execute(Command::new("Who", Value::Null).with_session(SessionId::named("mine")))
        .await;
    assert_eq!(result.value, Some(json!("session")));

    let result = bus
        .execute(Command::new("Who", Value::Null).with_session(SessionId::named("other")))
        .await;
    assert_eq!(result.value, Some(json!("bus")));

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn accounting_identity_holds_at_stable_points() {
    let bus = Bus::new(BusConfig {
        event_queue_size: 4,
        overflow_policy: OverflowPolicy::RejectNew,
        ..Default::default()
    })
    .unwrap();

    // Exactly one handler per published event type keeps per-handler
    // counts equal to per-event counts.
    bus.register_event_handler(
        "tick",
        |_event: Event| async move { Ok(()) },
        HandlerScope::Bus,
    )
    .unwrap();

    let identity = |bus: &Bus| {
        let s = bus.metrics_snapshot();
        let rhs = s.counter("events_processed_total")
            + s.counter("events_failed_total")
            + s.counter("events_dropped_total")
            + s.counter("events_rejected_total")
            + s.gauge("queue_size") as u64;
        (s.counter("events_published_total"), rhs)
    };

    // Queue fills, then rejects: 6 published = 4 queued + 2 rejected.
    for n in 0..6 {
        bus.publish(Event::new("tick", json!(n)));
    }
    let (lhs, rhs) = identity(&bus);
    assert_eq!(lhs, 6);
    assert_eq!(lhs, rhs);

    // After draining: 6 published = 4 processed + 2 rejected.
    bus.start().await;
    bus.wait_until_idle().await;
    let (lhs, rhs) = identity(&bus);
    assert_eq!(lhs, rhs);

    // Filtered publishes count as drops.
    bus.add_event_filter(EventTypeFilter::deny(["noisy"]));
    bus.publish(Event::new("noisy", Value::Null));
    let (lhs, rhs) = identity(&bus);
    assert_eq!(lhs, 7);
    assert_eq!(lhs, rhs);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn queue_size_never_exceeds_configured_capacity() {
    let bus = Bus::new(BusConfig {
        event_queue_size: 5,
        overflow_policy: OverflowPolicy::DropOldest,
        ..Default::default()
    })
    .unwrap();

    for n in 0..100 {
        bus.publish(Event::new("burst", json!(n)));
    }
    assert!(bus.queue_stats().max_size_reached <= 5);
}

#[tokio::test]
async fn execute_timeout_yields_timeout_result() {
    let bus = started_bus(BusConfig::default()).await;
    bus.register_command_handler(
        "Slow",
        |_c: Command| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<Value, HandlerError>(Value::Null)
        },
        HandlerScope::Bus,
    )
    .unwrap();

    let result = bus
        .execute_with_timeout(Command::new("Slow", Value::Null), Duration::from_millis(20))
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn session_close_cancels_in_flight_execute() {
    let bus = started_bus(BusConfig::default()).await;

    let session = bus.open_session(Some(SessionId::named("doomed"))).unwrap();
    session
        .register_command_handler("Slow", |_c: Command| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<Value, HandlerError>(Value::Null)
        })
        .unwrap();

    let in_flight = {
        let bus = bus.clone();
        tokio::spawn(async move {
            bus.execute(
                Command::new("Slow", Value::Null).with_session(SessionId::named("doomed")),
            )
            .await
        })
    };

    // Let the execute reach the handler, then tear the session down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.close();

    let result = in_flight.await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn operations_after_stop_are_refused() {
    let bus = started_bus(BusConfig::default()).await;
    bus.stop(Duration::from_millis(100)).await;

    let outcome = bus.publish(Event::new("late", Value::Null));
    assert!(!outcome.is_accepted());

    let result = bus.execute(Command::new("Late", Value::Null)).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::ShuttingDown));
}

#[tokio::test]
async fn shutdown_grace_drains_queued_events() {
    let bus = started_bus(BusConfig::default()).await;
    let counter = CountingEventHandler::new();
    bus.register_event_handler("tick", counter.clone(), HandlerScope::Bus)
        .unwrap();

    for n in 0..10 {
        bus.publish(Event::new("tick", json!(n)));
    }
    bus.stop(Duration::from_secs(2)).await;

    assert_eq!(counter.hits(), 10);
}

#[tokio::test]
async fn middleware_transform_reaches_handler_but_not_observability() {
    let bus = started_bus(BusConfig::default()).await;
    let hook = RecordingHook::new();
    bus.set_observability_hook(hook.clone());
    bus.add_command_middleware(ValidationMiddleware);

    struct Redact;

    #[async_trait::async_trait]
    impl relay_bus::CommandMiddleware for Redact {
        async fn handle(
            &self,
            mut command: Command,
            next: relay_bus::Next<'_>,
        ) -> relay_message::CommandResult {
            command.payload = json!("redacted");
            next.run(command).await
        }
    }
    bus.add_command_middleware(Redact);

    bus.register_command_handler(
        "Secret",
        |command: Command| async move { Ok::<Value, HandlerError>(command.payload) },
        HandlerScope::Bus,
    )
    .unwrap();

    let result = bus
        .execute(Command::new("Secret", json!("original")))
        .await;
    // The handler saw the transformed payload.
    assert_eq!(result.value, Some(json!("redacted")));

    bus.wait_until_idle().await;
    // CommandStarted still carries the caller's original command.
    let started = hook
        .events()
        .into_iter()
        .find(|event| event.event_type == relay_message::lifecycle::COMMAND_STARTED)
        .unwrap();
    assert_eq!(started.payload["command_type"], json!("Secret"));

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn predicate_filters_individual_handlers() {
    let bus = started_bus(BusConfig::default()).await;
    let counter = CountingEventHandler::new();

    bus.register_event_handler_with(
        "tick",
        counter.clone(),
        HandlerScope::Bus,
        relay_bus::priority::NORMAL,
        Some(Arc::new(|event: &Event| event.payload == json!("keep"))),
    )
    .unwrap();

    bus.publish(Event::new("tick", json!("keep")));
    bus.publish(Event::new("tick", json!("skip")));
    bus.publish(Event::new("tick", json!("keep")));
    bus.wait_until_idle().await;

    assert_eq!(counter.hits(), 2);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn panicking_handlers_are_isolated() {
    let bus = started_bus(BusConfig::default()).await;
    let counter = CountingEventHandler::new();

    bus.register_event_handler(
        "tick",
        |event: Event| async move {
            if event.payload.is_null() {
                panic!("handler exploded");
            }
            Ok(())
        },
        HandlerScope::Bus,
    )
    .unwrap();
    bus.register_event_handler("tick", counter.clone(), HandlerScope::Bus)
        .unwrap();

    bus.publish(Event::new("tick", Value::Null));
    bus.wait_until_idle().await;

    // The peer still ran; the panic became a counted failure.
    assert_eq!(counter.hits(), 1);
    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("events_failed_total"), 1);
    assert_eq!(snapshot.counter("events_processed_total"), 1);

    // A panicking command handler becomes a failed result, not an
    // unwind.
    bus.register_command_handler(
        "Boom",
        |command: Command| async move {
            if command.payload.is_null() {
                panic!("command exploded");
            }
            Ok::<Value, HandlerError>(command.payload)
        },
        HandlerScope::Bus,
    )
    .unwrap();
    let result = bus
        .execute(Command::new("Boom", Value::Null))
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::HandlerFailure));

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn duplicate_session_ids_are_rejected() {
    let bus = started_bus(BusConfig::default()).await;

    let first = bus.open_session(Some(SessionId::named("solo"))).unwrap();
    assert!(bus.open_session(Some(SessionId::named("solo"))).is_err());
    assert!(bus.open_session(Some(SessionId::bus())).is_err());

    first.close();
    // The id is released on close.
    let reopened = bus.open_session(Some(SessionId::named("solo"))).unwrap();
    reopened.close();

    bus.stop(Duration::from_millis(500)).await;
}
