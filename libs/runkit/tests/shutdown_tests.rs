//! Shutdown ordering, run loop triggers and hook failure handling.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::*;
use runkit::{EventKind, RuntimeConfig, RuntimeError, ServiceRef, ServiceState, ShutdownOptions};

#[tokio::test]
async fn interrupt_runs_hooks_in_order_one_at_a_time() {
    let registry = quiet_registry();
    let journal = Journal::default();
    let a = Arc::new(Hooked::new("a", &journal).delayed(Duration::from_millis(30)));
    let d = Arc::new(Hooked::new("d", &journal));
    registry.add(a.clone());
    registry.add(Plain::new("not-graceful"));
    registry.add(d.clone());

    let token = CancellationToken::new();
    let runner = {
        let registry = registry.clone();
        let token = token.clone();
        tokio::spawn(async move { registry.run(ShutdownOptions::Token(token)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!runner.is_finished());

    token.cancel();
    let report = timeout(WAIT, runner).await.unwrap().unwrap();

    assert_eq!(
        *journal.lock(),
        ["a:start", "a:end", "d:start", "d:end"].map(String::from)
    );
    assert_eq!(report.stopped, ["a", "d"]);
    assert!(report.is_clean());
    assert_eq!(a.calls(), 1);
    assert_eq!(d.calls(), 1);
    for service in registry.services() {
        assert_eq!(registry.state_of(&service), Some(ServiceState::ShutDown));
    }
}

#[tokio::test]
async fn shutdown_runs_once_for_concurrent_callers() {
    let registry = quiet_registry();
    let journal = Journal::default();
    let hooked = Arc::new(Hooked::new("once", &journal).delayed(Duration::from_millis(20)));
    registry.add(hooked.clone());

    let (first, second) = tokio::join!(registry.shutdown(), registry.shutdown());
    let third = registry.shutdown().await;

    assert_eq!(hooked.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn shutdown_event_precedes_first_hook() {
    let registry = quiet_registry();
    let journal = Journal::default();
    let announced = Arc::new(AtomicBool::new(false));
    {
        let journal = journal.clone();
        let announced = announced.clone();
        registry
            .events()
            .subscribe(EventKind::RuntimeShutdownInitiated, move |_| {
                announced.store(journal.lock().is_empty(), Ordering::SeqCst);
            });
    }
    let auditor = Arc::new(Auditor::default());
    registry.add(auditor.clone());
    registry.add(Arc::new(Hooked::new("late", &journal)));

    registry.shutdown().await;

    assert!(announced.load(Ordering::SeqCst));
    assert!(auditor.seen.lock().contains(&"shutdown".to_string()));
    assert!(registry.shutdown_token().is_cancelled());
}

#[tokio::test]
async fn failing_hooks_are_reported_and_do_not_stop_the_rest() {
    let registry = registry_with(RuntimeConfig {
        shutdown_hook_timeout: Some(Duration::from_millis(50)),
        ..RuntimeConfig::default()
    });
    let journal = Journal::default();
    registry.add(Arc::new(Hooked::new("errs", &journal).ending(HookOutcome::Err)));
    registry.add(Arc::new(
        Hooked::new("panics", &journal).ending(HookOutcome::Panic),
    ));
    registry.add(Arc::new(Hooked::new("hangs", &journal).ending(HookOutcome::Hang)));
    registry.add(Arc::new(Hooked::new("fine", &journal)));

    let report = timeout(WAIT, registry.shutdown()).await.unwrap();

    assert_eq!(report.stopped, ["fine"]);
    let failed: Vec<&str> = report
        .failures
        .iter()
        .filter_map(RuntimeError::service)
        .collect();
    assert_eq!(failed, ["errs", "panics", "hangs"]);
    assert!(report
        .failures
        .iter()
        .all(|e| e.as_label() == "service_shutdown_failed"));
    assert!(journal.lock().contains(&"fine:end".to_string()));
}

#[tokio::test]
async fn hooks_cover_only_services_present_at_shutdown() {
    let registry = quiet_registry();
    let journal = Journal::default();
    let kept = Arc::new(Hooked::new("kept", &journal));
    let dropped = Arc::new(Hooked::new("dropped", &journal));
    registry.add(kept.clone());
    registry.add(dropped.clone());
    let dropped_ref: ServiceRef = dropped.clone();
    registry.remove(&dropped_ref);

    let report = registry.shutdown().await;

    assert_eq!(report.stopped, ["kept"]);
    assert_eq!(dropped.calls(), 0);
}

#[tokio::test]
async fn add_after_shutdown_is_rejected() {
    let registry = quiet_registry();
    registry.shutdown().await;

    let plain = Plain::new("too-late");
    let err = registry.add(plain.clone()).wait().await.unwrap_err();

    assert!(matches!(err, RuntimeError::ShuttingDown { .. }));
    assert_eq!(plain.inits(), 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn pending_dependency_wait_ends_at_shutdown() {
    let registry = quiet_registry();
    let needs = Arc::new(NeedsStore::default());
    let handle = registry.add(needs.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;

    registry.shutdown().await;

    let err = timeout(WAIT, handle.wait()).await.unwrap().unwrap_err();
    assert!(matches!(err, RuntimeError::ShuttingDown { .. }));
    assert_eq!(needs.inits(), 0);
}

#[tokio::test]
async fn run_stops_when_external_future_completes() {
    let registry = quiet_registry();
    let journal = Journal::default();
    registry.add(Arc::new(Hooked::new("svc", &journal)));
    let loop_started = record(registry.events(), &[EventKind::RuntimeRunLoopInitiated]);

    let stop = tokio::time::sleep(Duration::from_millis(20));
    let report = timeout(
        WAIT,
        registry.run(ShutdownOptions::Future(Box::pin(stop))),
    )
    .await
    .unwrap();

    assert_eq!(report.stopped, ["svc"]);
    assert_eq!(loop_started.lock().len(), 1);
    assert_eq!(*journal.lock(), ["svc:start", "svc:end"].map(String::from));
}

#[tokio::test]
async fn run_returns_when_shutdown_is_called_directly() {
    let registry = quiet_registry();
    let runner = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.run(ShutdownOptions::Token(CancellationToken::new())).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let direct = registry.shutdown().await;
    let from_run = timeout(WAIT, runner).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&direct, &from_run));
}

#[tokio::test]
async fn shutdown_racing_a_registration_rejects_it() {
    let registry = quiet_registry();
    let meddler = Meddler::new(&registry, Meddle::Shutdown);
    let as_ref: ServiceRef = meddler.clone();

    let err = timeout(WAIT, registry.add(meddler.clone()).wait())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, RuntimeError::ShuttingDown { .. }));
    assert!(registry.is_shutting_down());
    assert_eq!(registry.state_of(&as_ref), None);
    assert_eq!(meddler.inits.load(Ordering::SeqCst), 0);
    assert_eq!(meddler.hooks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn entry_not_yet_initialized_at_shutdown_gets_its_hook_but_no_init() {
    let registry = quiet_registry();
    let journal = Journal::default();
    let hooked = Arc::new(Hooked::new("early", &journal));
    let handle = registry.add(hooked.clone());

    // Single-threaded test runtime: the init task has not been polled yet.
    let report = registry.shutdown().await;

    let err = timeout(WAIT, handle.wait()).await.unwrap().unwrap_err();
    assert!(matches!(err, RuntimeError::ShuttingDown { .. }));
    assert_eq!(report.stopped, ["early"]);
    assert_eq!(hooked.calls(), 1);
}

#[tokio::test]
async fn interrupt_before_run_is_consumed_by_run() {
    let registry = quiet_registry();
    let journal = Journal::default();
    registry.add(Arc::new(Hooked::new("svc", &journal)));
    registry.listen_for_signals();

    // Stands in for a signal delivered before the run loop starts.
    registry.shutdown_token().cancel();
    let report = timeout(WAIT, registry.run(ShutdownOptions::Signals))
        .await
        .unwrap();

    assert_eq!(report.stopped, ["svc"]);
    assert_eq!(*journal.lock(), ["svc:start", "svc:end"].map(String::from));
}
