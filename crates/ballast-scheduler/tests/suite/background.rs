use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ballast_scheduler::{CancellationToken, Cancelled, Scheduler, SchedulerConfig, TaskError};

#[test]
fn inline_scheduler_runs_background_work_before_returning() {
    let scheduler = Scheduler::inline();
    assert!(scheduler.is_inline());

    let ran = Arc::new(AtomicUsize::new(0));
    let mut task = scheduler.spawn_background({
        let ran = ran.clone();
        move |_token| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(5_u32)
        }
    });

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(task.try_result(), Some(Ok(5)));
}

#[test]
fn pooled_background_task_reports_its_result() {
    let scheduler = Scheduler::new(SchedulerConfig {
        background_threads: 2,
        timer_threads: 1,
    });
    assert!(!scheduler.is_inline());

    let mut task = scheduler.spawn_background(|_token| Ok("done"));
    let deadline = Instant::now() + Duration::from_secs(5);
    let result = loop {
        if let Some(result) = task.try_result() {
            break result;
        }
        assert!(Instant::now() < deadline, "background task never finished");
        std::thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(result, Ok("done"));
}

#[test]
fn panicking_background_task_reports_panicked() {
    let scheduler = Scheduler::inline();
    let mut task = scheduler.spawn_background::<(), _>(|_token| panic!("boom"));
    assert_eq!(task.try_result(), Some(Err(TaskError::Panicked)));
}

#[test]
fn cancelled_token_skips_work() {
    let scheduler = Scheduler::inline();
    let token = CancellationToken::new();
    token.cancel();

    let ran = Arc::new(AtomicUsize::new(0));
    let mut task = scheduler.spawn_background_with_token(token, {
        let ran = ran.clone();
        move |_token| {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(task.try_result(), Some(Err(TaskError::Cancelled)));
}

#[test]
fn task_body_can_report_cancellation() {
    let scheduler = Scheduler::inline();
    let mut task = scheduler.spawn_background::<(), _>(|_token| Err(Cancelled));
    assert_eq!(task.try_result(), Some(Err(TaskError::Cancelled)));
}

#[test]
fn cancelling_the_handle_reaches_the_job_token() {
    let scheduler = Scheduler::new(SchedulerConfig {
        background_threads: 1,
        timer_threads: 1,
    });

    let mut task = scheduler.spawn_background(|token| {
        while !token.is_cancelled() {
            std::thread::sleep(Duration::from_millis(2));
        }
        Err::<(), _>(Cancelled)
    });
    task.cancel();
    assert!(task.is_cancelled());

    let deadline = Instant::now() + Duration::from_secs(5);
    while task.try_result().is_none() {
        assert!(Instant::now() < deadline, "job ignored cancellation");
        std::thread::sleep(Duration::from_millis(5));
    }
}
