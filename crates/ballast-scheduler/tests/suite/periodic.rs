use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ballast_scheduler::Scheduler;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn periodic_task_ticks_until_cancelled() {
    let scheduler = Scheduler::inline();
    let ticks = Arc::new(AtomicUsize::new(0));

    let handle = scheduler.spawn_periodic("test", Duration::from_millis(10), {
        let ticks = ticks.clone();
        move || {
            ticks.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(handle.name(), "test");

    assert!(wait_until(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) >= 3));

    handle.cancel();
    handle.cancel();
    assert!(handle.is_cancelled());
    assert!(wait_until(Duration::from_secs(5), || handle.is_finished()));

    let after_cancel = ticks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
}

#[test]
fn dropping_the_handle_stops_the_timer() {
    let scheduler = Scheduler::inline();
    let ticks = Arc::new(AtomicUsize::new(0));

    let handle = scheduler.spawn_periodic("drop", Duration::from_millis(10), {
        let ticks = ticks.clone();
        move || {
            ticks.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert!(wait_until(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) >= 1));
    drop(handle);

    // Allow an in-flight tick to land before sampling.
    std::thread::sleep(Duration::from_millis(30));
    let after_drop = ticks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
}

#[test]
fn panicking_tick_does_not_stop_the_timer() {
    let scheduler = Scheduler::inline();
    let ticks = Arc::new(AtomicUsize::new(0));

    let _handle = scheduler.spawn_periodic("flaky", Duration::from_millis(5), {
        let ticks = ticks.clone();
        move || {
            if ticks.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick fails");
            }
        }
    });

    assert!(wait_until(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) >= 3));
}
