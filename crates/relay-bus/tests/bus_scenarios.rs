//! End-to-end scenarios for the bus: command happy path, missing
//! handlers, session cleanup, backpressure, retry with circuit breaking,
//! and priority dispatch with failure isolation.

use parking_lot::Mutex;
use relay_bus::testing::{CountingEventHandler, FailNTimesHandler, RecordingHook};
use relay_bus::{
    priority, Bus, BusConfig, CircuitBreakerConfig, CircuitState, ErrorKind, HandlerError,
    HandlerScope, JitterMode, OverflowPolicy, PublishOutcome, RejectReason, RetryConfig,
};
use relay_message::{lifecycle, Command, Event};
use relay_types::SessionId;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_delay_s: 0.001,
        max_delay_s: 0.005,
        exponential_base: 2.0,
        jitter: JitterMode::Full,
    }
}

async fn started_bus(config: BusConfig) -> Bus {
    let bus = Bus::new(config).expect("valid config");
    bus.start().await;
    bus
}

#[tokio::test]
async fn happy_path_command() {
    let bus = started_bus(BusConfig::default()).await;
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let log = log.clone();
        bus.set_observability_hook(move |event: &Event| {
            log.lock().push(event.event_type.clone());
        });
    }
    {
        let log = log.clone();
        bus.register_command_handler(
            "Ping",
            move |_command: Command| {
                let log = log.clone();
                async move {
                    log.lock().push("handler".to_string());
                    Ok::<Value, HandlerError>(json!("pong"))
                }
            },
            HandlerScope::Bus,
        )
        .unwrap();
    }

    let command = Command::new("Ping", Value::Null).with_session(SessionId::named("s1"));
    let command_id = command.command_id;
    let result = bus.execute(command).await;

    assert!(result.success);
    assert_eq!(result.command_id, command_id);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.value, Some(json!("pong")));

    // CommandStarted is observed strictly before the handler runs;
    // CommandResult strictly after.
    let observed = log.lock().clone();
    assert_eq!(
        observed,
        vec![
            lifecycle::COMMAND_STARTED.to_string(),
            "handler".to_string(),
            lifecycle::COMMAND_RESULT.to_string(),
        ]
    );

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn no_handler_fails_without_command_started() {
    let bus = started_bus(BusConfig::default()).await;
    let hook = RecordingHook::new();
    bus.set_observability_hook(hook.clone());

    let result = bus.execute(Command::new("Foo", Value::Null)).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::NoHandler));
    assert_eq!(result.attempts, 0);
    assert_eq!(hook.count_of(lifecycle::COMMAND_STARTED), 0);
    assert_eq!(hook.count_of(lifecycle::COMMAND_RESULT), 1);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn session_cleanup_removes_handlers_before_session_end() {
    let bus = started_bus(BusConfig::default()).await;
    let hook = RecordingHook::new();
    bus.set_observability_hook(hook.clone());

    let session = bus
        .open_session(Some(SessionId::named("job-1")))
        .unwrap();
    let counter = CountingEventHandler::new();
    session
        .register_event_handler("Tick", counter.clone())
        .unwrap();

    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.gauge("active_sessions"), 1);
    assert_eq!(snapshot.gauge("registered_handlers"), 1);

    for _ in 0..3 {
        assert!(session.publish(Event::new("Tick", Value::Null)).is_accepted());
    }
    bus.wait_until_idle().await;
    assert_eq!(counter.hits(), 3);

    session.close();
    assert_eq!(hook.count_of(lifecycle::SESSION_END), 1);

    // Events for the closed session no longer reach the handler.
    bus.publish(Event::new("Tick", Value::Null).with_session(SessionId::named("job-1")));
    bus.wait_until_idle().await;
    assert_eq!(counter.hits(), 3);

    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.gauge("active_sessions"), 0);
    assert_eq!(snapshot.gauge("registered_handlers"), 0);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn backpressure_reject_new() {
    // Not started: nothing drains, so the queue fills deterministically.
    let bus = Bus::new(BusConfig {
        event_queue_size: 3,
        overflow_policy: OverflowPolicy::RejectNew,
        ..Default::default()
    })
    .unwrap();

    let counter = CountingEventHandler::new();
    bus.register_event_handler("burst", counter.clone(), HandlerScope::Bus)
        .unwrap();

    let outcomes: Vec<PublishOutcome> = (0..5)
        .map(|n| bus.publish(Event::new("burst", Value::from(n))))
        .collect();

    assert_eq!(outcomes[0], PublishOutcome::Accepted);
    assert_eq!(outcomes[1], PublishOutcome::Accepted);
    assert_eq!(outcomes[2], PublishOutcome::Accepted);
    assert_eq!(
        outcomes[3],
        PublishOutcome::Rejected(RejectReason::QueueFull)
    );
    assert_eq!(
        outcomes[4],
        PublishOutcome::Rejected(RejectReason::QueueFull)
    );

    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("events_rejected_total"), 2);
    assert_eq!(snapshot.gauge("queue_size"), 3);
    // No handler ran for the rejected events (nothing ran at all).
    assert_eq!(counter.hits(), 0);
}

#[tokio::test]
async fn drop_oldest_evicts_and_counts() {
    let bus = Bus::new(BusConfig {
        event_queue_size: 3,
        overflow_policy: OverflowPolicy::DropOldest,
        ..Default::default()
    })
    .unwrap();

    for n in 0..4 {
        assert!(bus.publish(Event::new("burst", Value::from(n))).is_accepted());
    }
    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("events_dropped_total"), 1);
    assert_eq!(snapshot.gauge("queue_size"), 3);
}

#[tokio::test]
async fn retry_then_circuit_breaker_opens() {
    let bus = started_bus(BusConfig {
        retry: fast_retry(),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout_s: 60.0,
            success_threshold: 3,
        },
        ..Default::default()
    })
    .await;

    let hook = RecordingHook::new();
    bus.set_observability_hook(hook.clone());

    let handler = FailNTimesHandler::new(7);
    bus.register_command_handler("Flaky", handler.clone(), HandlerScope::Bus)
        .unwrap();

    // First execute: 1 + 3 retries, all failing.
    let first = Command::new("Flaky", Value::Null);
    let first_id = first.command_id;
    let result = bus.execute(first).await;
    assert!(!result.success);
    assert_eq!(result.attempts, 4);
    assert_eq!(handler.calls(), 4);

    // Second execute: the fifth consecutive failure opens the breaker
    // and cuts the retries short.
    let result = bus.execute(Command::new("Flaky", Value::Null)).await;
    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(handler.calls(), 5);
    let states = bus.circuit_breaker_states();
    assert_eq!(states["BUS::Flaky"].state, CircuitState::Open);

    // Third execute: rejected outright, the handler is never reached.
    let result = bus.execute(Command::new("Flaky", Value::Null)).await;
    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::CircuitOpen));
    assert_eq!(result.attempts, 0);
    assert_eq!(handler.calls(), 5);

    // The first failing command sits in the dead letter queue with its
    // full attempt count.
    let entries = bus.dead_letter_entries();
    assert!(entries
        .iter()
        .any(|entry| entry.command.command_id == first_id && entry.attempts == 4));

    // Breaker-rejected commands count as failed.
    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("commands_failed_total"), 3);
    assert_eq!(snapshot.counter("commands_sent_total"), 3);
    assert_eq!(snapshot.circuit_breakers["BUS::Flaky"], 1);

    // Every execute that resolved a handler paired a CommandStarted with
    // its CommandResult, the breaker-rejected one included.
    assert_eq!(hook.count_of(lifecycle::COMMAND_STARTED), 3);
    assert_eq!(hook.count_of(lifecycle::COMMAND_RESULT), 3);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn priority_order_and_failure_isolation() {
    let bus = started_bus(BusConfig::default()).await;
    let hook = RecordingHook::new();
    bus.set_observability_hook(hook.clone());

    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let log = log.clone();
        bus.register_event_handler_with(
            "E",
            move |_event: Event| {
                let log = log.clone();
                async move {
                    log.lock().push("high");
                    Err::<(), HandlerError>(HandlerError::new("boom"))
                }
            },
            HandlerScope::Bus,
            priority::HIGH,
            None,
        )
        .unwrap();
    }
    {
        let log = log.clone();
        bus.register_event_handler_with(
            "E",
            move |_event: Event| {
                let log = log.clone();
                async move {
                    log.lock().push("mid");
                    Ok(())
                }
            },
            HandlerScope::Bus,
            priority::NORMAL,
            None,
        )
        .unwrap();
    }
    {
        let log = log.clone();
        bus.register_event_handler_with(
            "E",
            move |_event: Event| {
                let log = log.clone();
                async move {
                    log.lock().push("low");
                    Ok(())
                }
            },
            HandlerScope::Bus,
            priority::LOW,
            None,
        )
        .unwrap();
    }

    assert!(bus.publish(Event::new("E", Value::Null)).is_accepted());
    bus.wait_until_idle().await;

    // Higher priority runs strictly first; the failure does not skip
    // peers.
    assert_eq!(*log.lock(), vec!["high", "mid", "low"]);
    assert_eq!(hook.count_of(lifecycle::HANDLER_FAILED), 1);

    let failed = hook
        .events()
        .into_iter()
        .find(|event| event.event_type == lifecycle::HANDLER_FAILED)
        .unwrap();
    assert_eq!(failed.payload["event_type"], json!("E"));

    let snapshot = bus.metrics_snapshot();
    assert_eq!(snapshot.counter("events_processed_total"), 2);
    assert_eq!(snapshot.counter("events_failed_total"), 1);

    bus.stop(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn dead_letter_redrive_succeeds() {
    let bus = started_bus(BusConfig {
        retry: RetryConfig {
            max_retries: 0,
            ..fast_retry()
        },
        ..Default::default()
    })
    .await;

    let handler = FailNTimesHandler::new(1);
    bus.register_command_handler("Once", handler, HandlerScope::Bus)
        .unwrap();

    let command = Command::new("Once", json!("payload"));
    let command_id = command.command_id;
    let result = bus.execute(command).await;
    assert!(!result.success);
    assert_eq!(bus.dead_letter_entries().len(), 1);

    let redriven = bus.retry_dead_letter(command_id).await.unwrap();
    assert!(redriven.success);
    assert_eq!(redriven.value, Some(json!("payload")));
    assert!(bus.dead_letter_entries().is_empty());

    assert!(bus.retry_dead_letter(command_id).await.is_none());

    bus.stop(Duration::from_millis(500)).await;
}
