use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_console::coordinator::{
    CoordinatorConfig, DeliveryMode, ExchangeCoordinator, ExchangeError,
};
use chat_console::render::NullSink;
use completion_provider::Turn;
use completion_provider_mock::ScriptedProvider;
use conversation::{ConversationWindow, EvictionGranularity, RetentionPolicy};
use serde_json::json;
use stream_ingest::CapturePlan;

fn window() -> ConversationWindow {
    ConversationWindow::new(
        vec![Turn::system("rules")],
        BTreeMap::new(),
        RetentionPolicy::PairedEviction {
            retained_turns: 10,
            granularity: EvictionGranularity::SingleStep,
        },
    )
}

fn marked_config(delivery: DeliveryMode) -> CoordinatorConfig {
    CoordinatorConfig::new(delivery, CapturePlan::marked_default("response"))
        .with_wait_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(25))
}

fn sink() -> Box<NullSink> {
    Box::new(NullSink)
}

#[test]
fn synchronous_exchange_commits_the_window_once() {
    let provider = Arc::new(ScriptedProvider::with_envelope_script("All good.\nBye."));
    let coordinator =
        ExchangeCoordinator::new(provider, marked_config(DeliveryMode::Synchronous));
    let mut window = window();

    let outcome = coordinator
        .completion(&mut window, &request(), "how did it go?", sink())
        .expect("scripted exchange should succeed");

    assert_eq!(outcome.extracted, "All good.\nBye.");
    assert_eq!(outcome.attempts, 1);

    assert_eq!(window.len(), 3);
    assert_eq!(window.turns()[1].content, "how did it go?");
    assert_eq!(window.turns()[2].content, "All good.\nBye.");
    assert_eq!(window.metadata().get("turns"), Some(&json!(1)));
    assert_eq!(window.metadata().get("tokens"), Some(&json!(42)));
}

#[test]
fn transport_failures_retry_up_to_the_attempt_bound() {
    let provider =
        Arc::new(ScriptedProvider::with_envelope_script("Recovered.").failing_attempts(2));
    let coordinator = ExchangeCoordinator::new(
        Arc::clone(&provider) as Arc<dyn completion_provider::CompletionProvider>,
        marked_config(DeliveryMode::Synchronous).with_max_attempts(3),
    );
    let mut window = window();

    let outcome = coordinator
        .completion(&mut window, &request(), "retry please", sink())
        .expect("third attempt should succeed");

    assert_eq!(outcome.attempts, 3);
    assert_eq!(provider.run_count(), 3);
    assert_eq!(window.len(), 3);
}

#[test]
fn retry_exhaustion_leaves_the_window_untouched() {
    let provider =
        Arc::new(ScriptedProvider::with_envelope_script("never seen").failing_attempts(5));
    let coordinator = ExchangeCoordinator::new(
        Arc::clone(&provider) as Arc<dyn completion_provider::CompletionProvider>,
        marked_config(DeliveryMode::Synchronous).with_max_attempts(2),
    );
    let mut window = window();
    let before = window.clone();

    let error = coordinator
        .completion(&mut window, &request(), "doomed", sink())
        .expect_err("exhausted retries must fail");

    assert!(matches!(
        error,
        ExchangeError::RetryExhausted { attempts: 2, .. }
    ));
    assert_eq!(provider.run_count(), 2);
    assert_eq!(window, before, "a failed exchange never partially commits");
}

#[test]
fn malformed_streams_fail_without_committing() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        "plain text without any envelope".to_string(),
    ]));
    let coordinator =
        ExchangeCoordinator::new(provider, marked_config(DeliveryMode::Synchronous));
    let mut window = window();
    let before = window.clone();

    let error = coordinator
        .completion(&mut window, &request(), "hello", sink())
        .expect_err("markerless stream must be malformed");

    assert!(matches!(error, ExchangeError::MalformedStream(_)));
    assert_eq!(window, before);
}

#[test]
fn background_exchange_hands_the_result_to_the_foreground() {
    let provider = Arc::new(
        ScriptedProvider::with_envelope_script("From the worker.")
            .with_chunk_delay(Duration::from_millis(20)),
    );
    let coordinator =
        ExchangeCoordinator::new(provider, marked_config(DeliveryMode::Background));
    let mut window = window();

    let outcome = coordinator
        .completion(&mut window, &request(), "work in background", sink())
        .expect("background exchange should succeed");

    assert_eq!(outcome.extracted, "From the worker.");
    assert_eq!(window.len(), 3);
    assert!(!coordinator.is_in_flight());
}

#[test]
fn second_completion_blocks_instead_of_starting_a_second_task() {
    let provider = Arc::new(ScriptedProvider::parked_ignoring_cancel());
    let coordinator = ExchangeCoordinator::new(
        Arc::clone(&provider) as Arc<dyn completion_provider::CompletionProvider>,
        CoordinatorConfig::new(
            DeliveryMode::Background,
            CapturePlan::marked_default("response"),
        )
        .with_wait_timeout(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(25)),
    );
    let mut window = window();
    let before = window.clone();

    let first = coordinator
        .completion(&mut window, &request(), "first", sink())
        .expect_err("parked provider cannot complete");
    assert!(matches!(first, ExchangeError::Timeout { .. }));

    // The first task is still outstanding, so the second call must wait for
    // the in-flight marker instead of spawning a concurrent task.
    let started = Instant::now();
    let second = coordinator
        .completion(&mut window, &request(), "second", sink())
        .expect_err("blocked call must time out");

    assert!(matches!(second, ExchangeError::Timeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(provider.run_count(), 1, "no second task may start");
    assert_eq!(window, before);
}

#[test]
fn timeout_signals_cancellation_to_the_pending_call() {
    let provider = Arc::new(ScriptedProvider::parked());
    let coordinator = ExchangeCoordinator::new(
        Arc::clone(&provider) as Arc<dyn completion_provider::CompletionProvider>,
        CoordinatorConfig::new(
            DeliveryMode::Background,
            CapturePlan::marked_default("response"),
        )
        .with_wait_timeout(Duration::from_millis(200))
        .with_poll_interval(Duration::from_millis(25)),
    );
    let mut window = window();

    let error = coordinator
        .completion(&mut window, &request(), "will time out", sink())
        .expect_err("parked provider cannot complete");
    assert!(matches!(error, ExchangeError::Timeout { .. }));

    // The cancelled worker observes the signal and clears the in-flight
    // marker, so the window is usable for subsequent turns.
    let deadline = Instant::now() + Duration::from_secs(2);
    while coordinator.is_in_flight() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!coordinator.is_in_flight());
}

fn request() -> completion_provider::RequestDescriptor {
    completion_provider::RequestDescriptor::flat("scripted", BTreeMap::new(), "rendered prompt")
}
