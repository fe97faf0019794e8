use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use ballast_engine::{CleanupDecision, CleanupError};
use ballast_memory::{CleanupTier, ClearFn, ClearOutcome, ClearRequest, DeviceProfile};
use proptest::prelude::*;

use super::support::{harness, harness_with, quiet_config, START_MS};

#[test]
fn manual_requests_respect_tier_cooldowns() {
    let h = harness();

    assert!(h.engine.request_cleanup(CleanupTier::Aggressive).is_started());
    assert_eq!(
        h.engine.request_cleanup(CleanupTier::Aggressive),
        CleanupDecision::RateLimited {
            retry_after: Duration::from_secs(30)
        }
    );
    // Other tiers have their own cooldown.
    assert!(h.engine.request_cleanup(CleanupTier::Normal).is_started());
    assert_eq!(
        h.cleared(),
        vec![CleanupTier::Aggressive, CleanupTier::Normal]
    );

    let snapshot = h.engine.metrics().snapshot();
    let aggressive = snapshot.operation("cleanup.aggressive").unwrap();
    assert_eq!((aggressive.runs, aggressive.skipped), (1, 1));

    h.clock.advance(Duration::from_secs(30));
    assert!(h.engine.request_cleanup(CleanupTier::Aggressive).is_started());
    assert_eq!(h.runs_of(CleanupTier::Aggressive), 2);
    assert_eq!(
        h.engine.orchestrator().last_run(CleanupTier::Aggressive),
        Some(START_MS + 30_000)
    );
}

#[test]
fn concurrent_requests_for_one_tier_start_a_single_run() {
    const THREADS: usize = 8;
    let h = harness();

    let clears = Arc::new(AtomicUsize::new(0));
    let counter = clears.clone();
    h.engine.register_clearable(Arc::new(ClearFn::new(
        "counter",
        move |_request: ClearRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            ClearOutcome::default()
        },
    )));

    let barrier = Barrier::new(THREADS);
    let decisions: Vec<CleanupDecision> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    h.engine.request_cleanup(CleanupTier::Aggressive)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let started = decisions.iter().filter(|d| d.is_started()).count();
    assert_eq!(started, 1, "{decisions:?}");
    assert!(decisions.iter().all(|d| d.is_started()
        || matches!(d, CleanupDecision::RateLimited { .. })));
    assert_eq!(h.runs_of(CleanupTier::Aggressive), 1);
    // Aggressive runs two passes; each pass clears the resource once.
    assert_eq!(clears.load(Ordering::SeqCst), 2);
}

#[test]
fn thermal_emergency_cleanup_is_never_rate_limited() {
    let h = harness();
    for _ in 0..3 {
        assert!(h
            .engine
            .request_cleanup(CleanupTier::ThermalEmergency)
            .is_started());
    }
    assert_eq!(h.runs_of(CleanupTier::ThermalEmergency), 3);
}

#[test]
fn in_memory_resources_are_cleared_once_per_pass() {
    let mut config = quiet_config();
    config.cleanup.emergency_passes = 4;
    let h = harness_with(config, DeviceProfile::new(1000.0, 60, false));

    let passes = Arc::new(Mutex::new(Vec::new()));
    let seen = passes.clone();
    h.engine.register_clearable(Arc::new(ClearFn::new(
        "passes",
        move |request: ClearRequest| {
            seen.lock().unwrap().push((request.pass, request.passes));
            ClearOutcome::default()
        },
    )));

    let report = h
        .engine
        .request_cleanup_and_wait(CleanupTier::Emergency)
        .unwrap();
    assert_eq!(report.passes, 4);
    assert_eq!(report.resources, 2);
    // The recorder releases one item of 1 KiB per pass.
    assert_eq!(report.released, ClearOutcome::new(4, 4096));
    assert_eq!(*passes.lock().unwrap(), vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
}

#[test]
fn a_panicking_resource_does_not_stop_the_run() {
    let h = harness();
    h.engine.register_clearable(Arc::new(ClearFn::new(
        "boom",
        |_: ClearRequest| -> ClearOutcome { panic!("pool already torn down") },
    )));
    let after = Arc::new(AtomicUsize::new(0));
    let counter = after.clone();
    h.engine.register_clearable(Arc::new(ClearFn::new(
        "after",
        move |_: ClearRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            ClearOutcome::default()
        },
    )));

    let report = h
        .engine
        .request_cleanup_and_wait(CleanupTier::Aggressive)
        .unwrap();
    assert_eq!(report.panicked, 1);
    assert_eq!(report.resources, 3);
    assert_eq!(after.load(Ordering::SeqCst), 2);
    assert_eq!(h.runs_of(CleanupTier::Aggressive), 1);

    let snapshot = h.engine.metrics().snapshot();
    assert_eq!(snapshot.operation("clear.boom").unwrap().panics, 2);
}

#[test]
fn io_resources_are_dispatched_once_per_run() {
    let h = harness();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();
    h.engine.register_clearable(Arc::new(ClearFn::io(
        "disk",
        move |request: ClearRequest| {
            seen.lock().unwrap().push(request);
            ClearOutcome::new(10, 0)
        },
    )));

    let report = h
        .engine
        .request_cleanup_and_wait(CleanupTier::Emergency)
        .unwrap();
    assert_eq!(report.io_dispatched, 1);
    // I/O results are not folded into the synchronous report.
    assert_eq!(report.released, ClearOutcome::new(3, 3072));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![ClearRequest::new(CleanupTier::Emergency)]
    );
}

#[test]
fn tier_filtered_resources_only_see_their_tiers() {
    let h = harness();
    let tiers = Arc::new(Mutex::new(Vec::new()));
    let seen = tiers.clone();
    h.engine.register_clearable_for(
        Arc::new(ClearFn::new("emergency_only", move |request: ClearRequest| {
            seen.lock().unwrap().push(request.tier);
            ClearOutcome::default()
        })),
        &[CleanupTier::Emergency, CleanupTier::ThermalEmergency],
    );

    h.engine.request_cleanup(CleanupTier::Normal);
    h.engine.request_cleanup(CleanupTier::Aggressive);
    assert!(tiers.lock().unwrap().is_empty());

    h.engine.request_cleanup(CleanupTier::ThermalEmergency);
    assert!(tiers
        .lock()
        .unwrap()
        .iter()
        .all(|&tier| tier == CleanupTier::ThermalEmergency));
    assert!(!tiers.lock().unwrap().is_empty());
}

#[test]
fn waiting_for_a_cooling_tier_reports_the_retry_delay() {
    let h = harness();
    h.engine
        .request_cleanup_and_wait(CleanupTier::Normal)
        .unwrap();
    h.clock.advance(Duration::from_secs(100));

    match h.engine.request_cleanup_and_wait(CleanupTier::Normal) {
        Err(CleanupError::RateLimited { tier, retry_after }) => {
            assert_eq!(tier, CleanupTier::Normal);
            assert_eq!(retry_after, Duration::from_secs(200));
        }
        other => panic!("expected a rate-limited error, got {other:?}"),
    }
}

#[test]
fn registered_names_include_engine_owned_resources() {
    let h = harness();
    let _cache = h.engine.memory_cache::<String, u32>("sprites");
    assert_eq!(
        h.engine.orchestrator().registered(),
        vec!["recorder".to_owned(), "sprites".to_owned()]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn aggressive_runs_are_at_least_one_cooldown_apart(
        gaps_ms in proptest::collection::vec(0u64..45_000, 1..40)
    ) {
        let h = harness();
        let cooldown_ms = 30_000;
        let mut now = START_MS;
        let mut last_run: Option<u64> = None;
        let mut expected = 0;

        for gap in gaps_ms {
            h.clock.advance(Duration::from_millis(gap));
            now += gap;
            let due = last_run.map_or(true, |last| now - last >= cooldown_ms);
            prop_assert_eq!(h.engine.request_cleanup(CleanupTier::Aggressive).is_started(), due);
            if due {
                last_run = Some(now);
                expected += 1;
            }
        }
        prop_assert_eq!(h.runs_of(CleanupTier::Aggressive), expected);
    }
}
