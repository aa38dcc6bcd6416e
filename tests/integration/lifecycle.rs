//! Lifecycle integration tests.
//!
//! Tests that run tasks through the queue and check which callbacks fire,
//! in which order, and what the `succeeded` flag ends up as.

use mold::testing::{Call, CallLog, fail_with, succeed_with};
use mold::{QueueConfig, RunOutcome, Task, TaskError, TaskOptions, TaskQueue, from_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{init_tracing, wait_finished};

const TIMEOUT: Duration = Duration::from_secs(5);

fn queue() -> TaskQueue {
    init_tracing();
    TaskQueue::new(QueueConfig::default().with_task_defaults(TaskOptions::current_thread()))
        .unwrap()
}

#[tokio::test]
async fn test_success_run_fires_start_return_success() {
    let queue = queue();
    let log = CallLog::new();

    let handle = queue
        .submit(log.instrument(queue.task("fetch", succeed_with(3u32))))
        .unwrap();
    wait_finished(&handle, TIMEOUT).await;

    assert_eq!(
        log.calls(),
        vec![Call::Start, Call::Return, Call::Success("3".into())]
    );
    assert!(handle.succeeded());
}

#[tokio::test]
async fn test_failing_task_without_dependencies() {
    let queue = queue();
    let log = CallLog::new();

    let handle = queue
        .submit(log.instrument(queue.task("a", fail_with::<()>("E"))))
        .unwrap();
    wait_finished(&handle, TIMEOUT).await;

    // Zero dependencies, so the return callback fires.
    assert_eq!(
        log.calls(),
        vec![
            Call::Start,
            Call::Return,
            Call::Failure("execution failed: E".into())
        ]
    );
    assert!(!handle.succeeded());
}

#[tokio::test]
async fn test_failure_receives_original_error() {
    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded for {0}")]
    struct Quota(String);

    let queue = queue();
    let (tx, rx) = tokio::sync::oneshot::channel();

    queue
        .submit(
            queue
                .task_fn("upload", || Err::<(), _>(TaskError::other(Quota("alice".into()))))
                .on_failure(move |err| {
                    let _ = tx.send(err);
                }),
        )
        .unwrap();

    let err = rx.await.unwrap();
    match err {
        TaskError::Other(inner) => {
            let quota = inner.downcast_ref::<Quota>().expect("original error type");
            assert_eq!(quota.0, "alice");
        }
        other => panic!("Expected Other, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_terminal_callback_per_run() {
    let queue = queue();
    let mut runs = Vec::new();

    for i in 0..20u32 {
        let log = CallLog::new();
        let task = if i % 3 == 0 {
            queue.task(format!("t{i}"), fail_with::<u32>("odd one out"))
        } else {
            queue.task(format!("t{i}"), succeed_with(i))
        };
        let handle = queue.submit(log.instrument(task)).unwrap();
        runs.push((log, handle));
    }

    queue.wait_until_all_finished().await;
    for (log, handle) in runs {
        wait_finished(&handle, TIMEOUT).await;
        assert_eq!(log.terminal_count(), 1, "task {}", handle.name());
        let calls = log.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], Call::Start);
        assert_eq!(calls[1], Call::Return);
    }
}

#[tokio::test]
async fn test_closed_gate_fires_nothing() {
    let queue = queue();
    let log = CallLog::new();
    let body_runs = Arc::new(AtomicUsize::new(0));

    let counter = body_runs.clone();
    let op = from_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, TaskError>(())
    })
    .when(|| false);

    let handle = queue.submit(log.instrument(queue.task("gated", op))).unwrap();
    wait_finished(&handle, TIMEOUT).await;

    assert!(log.is_empty());
    assert_eq!(body_runs.load(Ordering::SeqCst), 0);
    assert!(handle.succeeded());
}

#[tokio::test]
async fn test_cancel_before_body_fires_nothing() {
    let queue = queue();
    let log = CallLog::new();
    let blocker = queue.task_fn("blocker", || {
        std::thread::sleep(Duration::from_millis(30));
        Ok(())
    });
    let blocker_handle = blocker.handle();

    let task = log.instrument(queue.task("victim", succeed_with(1))).depends_on(&blocker_handle);
    let handle = task.handle();
    handle.cancel();

    queue.submit(task).unwrap();
    queue.submit(blocker).unwrap();
    wait_finished(&handle, TIMEOUT).await;

    assert!(log.is_empty());
    assert!(handle.is_cancelled());
    assert!(handle.succeeded());
}

#[tokio::test]
async fn test_unobserved_failure_is_silent_but_flagged() {
    let queue = queue();

    let handle = queue
        .submit(queue.task("quiet", fail_with::<()>("nobody listens")))
        .unwrap();
    wait_finished(&handle, TIMEOUT).await;

    assert!(!handle.succeeded());
}

#[test]
fn test_direct_run_reports_outcome() {
    let outcome = Task::new("direct", fail_with::<()>("nope"))
        .callbacks_on_current_thread()
        .run();
    assert_eq!(
        outcome,
        RunOutcome::Failed {
            error: "execution failed: nope".into()
        }
    );
}
