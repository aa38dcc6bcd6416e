//! Dependency gating integration tests.

use mold::testing::{Call, CallLog, fail_with, succeed_with};
use mold::{QueueConfig, TaskError, TaskOptions, TaskQueue};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{init_tracing, wait_finished};

const TIMEOUT: Duration = Duration::from_secs(5);

fn queue_with(options: TaskOptions) -> TaskQueue {
    init_tracing();
    TaskQueue::new(QueueConfig::default().with_task_defaults(options)).unwrap()
}

#[tokio::test]
async fn test_failed_predecessor_blocks_successor() {
    let queue = queue_with(TaskOptions::current_thread());
    let a_log = CallLog::new();
    let b_log = CallLog::new();

    let a = a_log.instrument(queue.task("a", fail_with::<()>("E")));
    let a_handle = a.handle();
    let b = b_log
        .instrument(queue.task("b", succeed_with(1)))
        .depends_on(&a_handle);

    let b_handle = queue.submit(b).unwrap();
    queue.submit(a).unwrap();
    wait_finished(&b_handle, TIMEOUT).await;

    assert!(!a_handle.succeeded());
    assert_eq!(a_log.terminal_count(), 1);

    // B never ran and never reached its failure path: it keeps the default
    // `succeeded = true` even though it did no work.
    assert!(b_log.is_empty());
    assert!(b_handle.succeeded());
}

#[tokio::test]
async fn test_skipped_successor_does_not_block_grandchild() {
    let queue = queue_with(TaskOptions::current_thread());
    let c_log = CallLog::new();

    let a = queue.task("a", fail_with::<()>("E"));
    let a_handle = a.handle();
    let b = queue.task("b", succeed_with(())).depends_on(&a_handle);
    let b_handle = b.handle();
    let c = c_log
        .instrument(queue.task("c", succeed_with("ran")))
        .depends_on(&b_handle);

    let c_handle = queue.submit(c).unwrap();
    queue.submit(b).unwrap();
    queue.submit(a).unwrap();
    wait_finished(&c_handle, TIMEOUT).await;

    // B was skipped but still reports success, so C runs.
    assert_eq!(c_log.terminal_count(), 1);
    assert_eq!(c_log.calls().last(), Some(&Call::Success("\"ran\"".into())));
}

#[tokio::test]
async fn test_lenient_gating_runs_after_failure() {
    let queue = queue_with(TaskOptions::current_thread().with_strict_dependency_gating(false));
    let log = CallLog::new();

    let a = queue.task("a", fail_with::<()>("E"));
    let a_handle = a.handle();
    let b = log
        .instrument(queue.task("b", succeed_with(2)))
        .depends_on(&a_handle);

    queue.submit(a).unwrap();
    let b_handle = queue.submit(b).unwrap();
    wait_finished(&b_handle, TIMEOUT).await;

    assert_eq!(
        log.calls(),
        vec![Call::Start, Call::Return, Call::Success("2".into())]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependent_sees_final_succeeded_value() {
    let queue = queue_with(TaskOptions::current_thread());

    for round in 0..20 {
        let a = queue.task(format!("a{round}"), fail_with::<()>("E"));
        let a_handle = a.handle();
        let observed = Arc::new(Mutex::new(None));

        let slot = observed.clone();
        let upstream = a_handle.clone();
        let b = queue
            .task_fn(format!("b{round}"), || Ok(()))
            .strict_dependency_gating(false)
            .depends_on(&a_handle)
            .on_start(move || {
                *slot.lock().unwrap() = Some((upstream.is_finished(), upstream.succeeded()));
            });

        queue.submit(a).unwrap();
        let b_handle = queue.submit(b).unwrap();
        wait_finished(&b_handle, TIMEOUT).await;

        assert_eq!(*observed.lock().unwrap(), Some((true, false)));
    }
}

#[tokio::test]
async fn test_diamond_runs_join_after_both_branches() {
    let queue = queue_with(TaskOptions::current_thread());
    let order = Arc::new(Mutex::new(Vec::new()));

    let record = |name: &'static str| {
        let order = order.clone();
        move || {
            order.lock().unwrap().push(name);
            Ok::<_, TaskError>(())
        }
    };

    let root = queue.task_fn("root", record("root"));
    let root_handle = root.handle();
    let left = queue.task_fn("left", record("left")).depends_on(&root_handle);
    let right = queue.task_fn("right", record("right")).depends_on(&root_handle);
    let (left_handle, right_handle) = (left.handle(), right.handle());
    let join = queue
        .task_fn("join", record("join"))
        .depends_on(&left_handle)
        .depends_on(&right_handle);

    let join_handle = queue.submit(join).unwrap();
    queue.submit(right).unwrap();
    queue.submit(left).unwrap();
    queue.submit(root).unwrap();
    wait_finished(&join_handle, TIMEOUT).await;

    let order = order.lock().unwrap().clone();
    assert_eq!(order.len(), 4);
    assert_eq!(order[0], "root");
    assert_eq!(order[3], "join");
}

#[tokio::test]
async fn test_return_callback_fires_once_dependencies_settled() {
    let queue = queue_with(TaskOptions::current_thread().with_strict_dependency_gating(false));
    let log = CallLog::new();

    let ok = queue.task("ok", succeed_with(()));
    let bad = queue.task("bad", fail_with::<()>("E"));
    let (ok_handle, bad_handle) = (ok.handle(), bad.handle());
    let observer = log
        .instrument(queue.task("observer", fail_with::<()>("own failure")))
        .depends_on(&ok_handle)
        .depends_on(&bad_handle);

    let handle = queue.submit(observer).unwrap();
    queue.submit(ok).unwrap();
    queue.submit(bad).unwrap();
    wait_finished(&handle, TIMEOUT).await;

    // Return fires regardless of this task's own outcome.
    assert_eq!(
        log.calls(),
        vec![
            Call::Start,
            Call::Return,
            Call::Failure("execution failed: own failure".into())
        ]
    );
}
