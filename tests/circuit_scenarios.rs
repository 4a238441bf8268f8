//! Circuit lifecycle scenarios driven through the registry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tripwire::config::BreakerDefaults;
use tripwire::resilience::{
    CircuitError, CircuitEvent, CircuitOptions, CircuitRegistry, CircuitState, FallbackContext,
};

type Registry = CircuitRegistry<String, String>;

fn registry() -> Registry {
    Registry::new(BreakerDefaults::default())
}

fn options() -> CircuitOptions<String, String> {
    CircuitOptions::new()
        .failure_threshold(2)
        .success_threshold(2)
        .reset_timeout(Duration::from_millis(1000))
}

async fn ok(registry: &Registry, key: &str) -> Result<String, CircuitError<String>> {
    registry.execute(key, || async { Ok("ok".to_string()) }).await
}

async fn fail(registry: &Registry, key: &str) -> Result<String, CircuitError<String>> {
    registry.execute(key, || async { Err("boom".to_string()) }).await
}

#[tokio::test(start_paused = true)]
async fn test_full_recovery_cycle() {
    let registry = registry();
    registry.register("svc", options());

    assert!(matches!(fail(&registry, "svc").await, Err(CircuitError::OperationFailed { .. })));
    assert_eq!(registry.state("svc"), Some(CircuitState::Closed));
    assert!(fail(&registry, "svc").await.is_err());
    assert_eq!(registry.state("svc"), Some(CircuitState::Open));

    // Rejected without running the operation.
    let calls = AtomicU32::new(0);
    let result = registry
        .execute("svc", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("ran".to_string())
        })
        .await;
    match result {
        Err(CircuitError::Open { key, retry_in }) => {
            assert_eq!(key, "svc");
            assert!(retry_in <= Duration::from_millis(1000));
        }
        other => panic!("expected open rejection, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(1001)).await;
    assert_eq!(ok(&registry, "svc").await.unwrap(), "ok");
    assert_eq!(registry.state("svc"), Some(CircuitState::HalfOpen));

    ok(&registry, "svc").await.unwrap();
    assert_eq!(registry.state("svc"), Some(CircuitState::Closed));

    let snapshot = registry.snapshot("svc").unwrap();
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.success_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_trial_failure_reopens_with_fresh_timeout() {
    let registry = registry();
    registry.register("svc", options());
    fail(&registry, "svc").await.ok();
    fail(&registry, "svc").await.ok();

    tokio::time::advance(Duration::from_millis(1000)).await;
    let err = fail(&registry, "svc").await.unwrap_err();
    assert!(matches!(err, CircuitError::OperationFailed { ref source, .. } if source == "boom"));
    assert_eq!(registry.state("svc"), Some(CircuitState::Open));

    // The reset timeout restarts from the failed trial.
    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(ok(&registry, "svc").await.unwrap_err().is_open());
    tokio::time::advance(Duration::from_millis(2)).await;
    assert!(ok(&registry, "svc").await.is_ok());
    assert_eq!(registry.state("svc"), Some(CircuitState::HalfOpen));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_receives_context() {
    let registry = registry();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    registry.register(
        "svc",
        options().fallback(move |ctx: FallbackContext<String>| {
            recorder
                .lock()
                .unwrap()
                .push((ctx.state, ctx.error.clone(), ctx.last_failure.clone()));
            async move { Ok(format!("cached for {}", ctx.key)) }
        }),
    );

    fail(&registry, "svc").await.ok();
    fail(&registry, "svc").await.ok();
    assert_eq!(ok(&registry, "svc").await.unwrap(), "cached for svc");

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.as_slice(),
        &[(CircuitState::Open, None, Some("boom".to_string()))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_every_concurrent_trial_by_default() {
    let registry = Arc::new(registry());
    registry.register(
        "svc",
        CircuitOptions::new()
            .failure_threshold(1)
            .success_threshold(3)
            .reset_timeout(Duration::from_millis(100)),
    );
    fail(&registry, "svc").await.ok();
    assert_eq!(registry.state("svc"), Some(CircuitState::Open));

    tokio::time::advance(Duration::from_millis(100)).await;

    let in_flight = Arc::new(AtomicU32::new(0));
    let (release, gate) = tokio::sync::watch::channel(false);
    let mut trials = Vec::new();
    for _ in 0..3 {
        let (registry, in_flight, mut gate) = (registry.clone(), in_flight.clone(), gate.clone());
        trials.push(tokio::spawn(async move {
            registry
                .execute("svc", || async move {
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let _ = gate.wait_for(|open| *open).await;
                    Ok::<_, String>("ok".to_string())
                })
                .await
        }));
    }

    while in_flight.load(Ordering::SeqCst) < 3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(registry.state("svc"), Some(CircuitState::HalfOpen));

    release.send(true).unwrap();
    for trial in trials {
        assert_eq!(trial.await.unwrap().unwrap(), "ok");
    }
    assert_eq!(in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(registry.state("svc"), Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_unregistered_key_passes_through() {
    let registry = registry();

    assert_eq!(ok(&registry, "ghost").await.unwrap(), "ok");
    let err = fail(&registry, "ghost").await.unwrap_err();
    assert_eq!(err.key(), Some("ghost"));
    assert!(!registry.contains("ghost"));
    assert_eq!(registry.state("ghost"), None);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_listener_sees_transitions_in_order() {
    let registry = registry();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    registry.subscribe(move |event: &CircuitEvent| {
        if let CircuitEvent::StateChanged { from, to, .. } = event {
            sink.lock().unwrap().push((*from, *to));
        }
    });
    registry.register("svc", options());

    fail(&registry, "svc").await.ok();
    fail(&registry, "svc").await.ok();
    tokio::time::advance(Duration::from_millis(1000)).await;
    ok(&registry, "svc").await.unwrap();
    ok(&registry, "svc").await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_creates_one_circuit() {
    let registry = Arc::new(registry());

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register("shared", CircuitOptions::new().failure_threshold(i + 1))
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_are_all_counted() {
    let registry = Arc::new(registry());
    registry.register("busy", CircuitOptions::new().failure_threshold(1000));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .execute("busy", || async {
                    tokio::task::yield_now().await;
                    Err::<String, _>("boom".to_string())
                })
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    let snapshot = registry.snapshot("busy").unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 50);
}

#[tokio::test(start_paused = true)]
async fn test_reset_all_closes_everything() {
    let registry = registry();
    registry.register("a", options());
    registry.register("b", options());
    for key in ["a", "b"] {
        fail(&registry, key).await.ok();
        fail(&registry, key).await.ok();
    }

    registry.reset_all();
    assert_eq!(registry.state("a"), Some(CircuitState::Closed));
    assert_eq!(registry.state("b"), Some(CircuitState::Closed));
    assert_eq!(ok(&registry, "a").await.unwrap(), "ok");
}
