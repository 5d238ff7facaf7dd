//! Watch engine against the in-memory machine driver

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use unifleet_drivers::{InMemoryMachineDriver, StreamFault};
use unifleet_types::{FleetEvent, FleetEventEnvelope, MachineState};
use unifleet_watch::{WatchConfig, WatchError, WatchRegistry, Watcher};

const LONG_POLL: Duration = Duration::from_secs(3600);

async fn next_event(
    rx: &mut broadcast::Receiver<FleetEventEnvelope>,
    pred: impl Fn(&FleetEvent) -> bool,
) -> FleetEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let envelope = rx.recv().await.expect("event channel closed");
            if pred(&envelope.event) {
                return envelope.event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn started(name: &'static str) -> impl Fn(&FleetEvent) -> bool {
    move |e: &FleetEvent| matches!(e, FleetEvent::ObservationStarted { name: n, .. } if n == name)
}

fn ended(name: &'static str) -> impl Fn(&FleetEvent) -> bool {
    move |e: &FleetEvent| matches!(e, FleetEvent::ObservationEnded { name: n, .. } if n == name)
}

#[tokio::test]
async fn quit_together_with_nothing_to_watch_returns_promptly() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    let watcher = Watcher::new(
        driver,
        WatchConfig::default()
            .with_poll_interval(LONG_POLL)
            .with_quit_together(true),
    );

    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        watcher.watch(CancellationToken::new()),
    )
    .await
    .expect("watch did not return before the second tick")
    .unwrap();

    assert_eq!(summary.observed, 0);
}

#[tokio::test]
async fn terminal_state_removes_machine_from_registry() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    let machine = driver.seed("web", MachineState::Starting);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_quit_together(true),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        tokio::spawn(async move { watcher.run(registry, CancellationToken::new()).await })
    };

    next_event(&mut events, started("web")).await;
    assert!(registry.contains(&machine.id));

    driver.set_state("web", MachineState::Running);
    next_event(&mut events, |e: &FleetEvent| {
        matches!(e, FleetEvent::StateChanged { state: MachineState::Running, .. })
    })
    .await;
    assert!(registry.contains(&machine.id));
    assert_eq!(registry.get(&machine.id).unwrap().state, MachineState::Running);

    driver.set_state("web", MachineState::Exited);
    let end = next_event(&mut events, ended("web")).await;
    assert!(matches!(end, FleetEvent::ObservationEnded { reason, .. } if reason == "machine exited"));
    assert!(!registry.contains(&machine.id));

    // Exited machines are not picked up again, so the watch quits on its own.
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.observed, 1);
    assert_eq!(summary.released, 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn cancellation_drains_every_observer() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("web", MachineState::Running);
    driver.seed("db", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(LONG_POLL),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("web")).await;
    next_event(&mut events, started("db")).await;
    assert_eq!(registry.len(), 2);

    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(summary.released, 2);
    assert!(registry.is_empty());
    // The machines themselves are untouched.
    assert!(driver.removals().is_empty());
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.fail_list(true);
    let watcher = Watcher::new(driver, WatchConfig::default());

    let err = watcher.watch(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WatchError::Listing(_)));
}

#[tokio::test]
async fn listing_failure_mid_watch_drains_observers() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("web", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(Duration::from_millis(20)),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        tokio::spawn(async move { watcher.run(registry, CancellationToken::new()).await })
    };

    next_event(&mut events, started("web")).await;
    driver.fail_list(true);

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(WatchError::Listing(_))));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn unopenable_stream_is_skipped_for_the_rest_of_the_watch() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("a", MachineState::Running);
    driver.seed("b", MachineState::Running);
    driver.fail_watch("a");

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(Duration::from_millis(10)),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("b")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(driver.watch_calls(), 2);
    let names: Vec<String> = registry.snapshot().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["b"]);

    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.observed, 2);
    assert_eq!(summary.unobservable.len(), 1);
}

#[tokio::test]
async fn non_event_stream_end_is_benign_and_still_removes() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    let machine = driver.seed("web", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(LONG_POLL),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("web")).await;
    assert!(driver.inject_fault("web", StreamFault::NonEvent));

    let end = next_event(&mut events, ended("web")).await;
    assert!(
        matches!(end, FleetEvent::ObservationEnded { reason, .. } if reason == "event stream ended")
    );
    assert!(!registry.contains(&machine.id));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn broken_stream_only_affects_its_machine() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("web", MachineState::Running);
    let db = driver.seed("db", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(LONG_POLL),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("web")).await;
    next_event(&mut events, started("db")).await;
    driver.inject_fault("web", StreamFault::Broken("socket reset".to_string()));

    let end = next_event(&mut events, ended("web")).await;
    assert!(matches!(end, FleetEvent::ObservationEnded { reason, .. } if reason.contains("socket reset")));
    assert!(registry.contains(&db.id));
    assert_eq!(registry.len(), 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn filter_limits_observation() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("web", MachineState::Running);
    driver.seed("db", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default()
            .with_filter("db")
            .with_poll_interval(LONG_POLL),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("db")).await;
    assert_eq!(registry.len(), 1);

    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.observed, 1);
    assert_eq!(driver.watch_calls(), 1);
}

#[tokio::test]
async fn state_queued_ahead_of_stream_end_is_still_reported() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    let machine = driver.seed("web", MachineState::Running);

    let watcher = Arc::new(Watcher::new(
        driver.clone(),
        WatchConfig::default().with_poll_interval(LONG_POLL),
    ));
    let mut events = watcher.subscribe();
    let registry = Arc::new(WatchRegistry::new());
    let cancel = CancellationToken::new();
    let handle = {
        let watcher = watcher.clone();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { watcher.run(registry, cancel).await })
    };

    next_event(&mut events, started("web")).await;
    driver.set_state("web", MachineState::Exited);
    driver.inject_fault("web", StreamFault::NonEvent);

    let changed = next_event(&mut events, |e: &FleetEvent| {
        matches!(e, FleetEvent::StateChanged { .. })
    })
    .await;
    assert!(matches!(
        changed,
        FleetEvent::StateChanged { state: MachineState::Exited, .. }
    ));
    let end = next_event(&mut events, ended("web")).await;
    assert!(matches!(end, FleetEvent::ObservationEnded { reason, .. } if reason == "machine exited"));
    assert!(!registry.contains(&machine.id));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn quit_together_returns_when_only_match_is_unobservable() {
    let driver = Arc::new(InMemoryMachineDriver::new("qemu"));
    driver.seed("web", MachineState::Running);
    driver.fail_watch("web");

    let watcher = Watcher::new(
        driver.clone(),
        WatchConfig::default()
            .with_poll_interval(LONG_POLL)
            .with_quit_together(true),
    );

    let summary = tokio::time::timeout(
        Duration::from_secs(2),
        watcher.watch(CancellationToken::new()),
    )
    .await
    .expect("watch waited for another tick")
    .unwrap();

    assert_eq!(summary.observed, 1);
    assert_eq!(summary.released, 0);
    assert_eq!(summary.unobservable.len(), 1);
    assert_eq!(driver.watch_calls(), 1);
}
