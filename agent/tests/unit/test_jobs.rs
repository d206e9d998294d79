//! Job intake, deduplication and worker tests

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_models::models::JobState;
use fleetagent::errors::AgentError;
use fleetagent::host::RunMode;
use fleetagent::jobs::manager::{JobManager, Submission};
use fleetagent::utils::Backoff;
use fleetagent::workers::{jobs, poller};
use tokio::sync::mpsc;
use tokio_test::task;
use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready};

use crate::fakes::*;

fn reboot_harness() -> Harness {
    Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "reboot", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    )
}

#[tokio::test]
async fn test_duplicate_submission_runs_once() {
    let h = reboot_harness();
    let manager = Arc::new(JobManager::new(Arc::new(h.context(RunMode::Container, false))));

    let first = manager.submit("job/1");
    assert_eq!(manager.in_flight_count(), 1);

    let second = manager.submit("job/1");
    assert!(second.is_duplicate());
    assert_eq!(manager.in_flight_count(), 1);

    let Submission::Accepted(handle) = first else {
        panic!("first submission was not accepted");
    };
    let output = assert_ok!(assert_ok!(handle.await));
    assert!(output.contains("helper-1"));

    assert_eq!(h.control.get_job_calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.in_flight_count(), 0);
    assert_eq!(h.engine().helpers.lock().unwrap().len(), 1);

    // a finished job may be submitted again
    let Submission::Accepted(handle) = manager.submit("job/1") else {
        panic!("resubmission was not accepted");
    };
    assert_ok!(assert_ok!(handle.await));
    assert_eq!(h.control.get_job_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_job_update_sequence() {
    let h = reboot_harness();
    let manager = JobManager::new(Arc::new(h.context(RunMode::Container, false)));

    let output = manager.process("job/1").await.unwrap();

    let updates = h.control.job_updates();
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|(id, _)| id == "job/1"));

    assert_eq!(updates[0].1.state, Some(JobState::Running));
    assert_eq!(updates[0].1.progress, Some(10));
    assert_eq!(updates[1].1.state, None);
    assert_eq!(updates[1].1.progress, Some(30));
    assert_eq!(updates[2].1.state, Some(JobState::Success));
    assert_eq!(updates[2].1.progress, Some(100));
    assert_eq!(updates[2].1.return_code, Some(0));
    assert_eq!(updates[2].1.status_message.as_deref(), Some(output.as_str()));
}

#[tokio::test]
async fn test_missing_job_is_not_reported() {
    let h = reboot_harness();
    let manager = Arc::new(JobManager::new(Arc::new(h.context(RunMode::Container, false))));

    let Submission::Accepted(handle) = manager.submit("job/404") else {
        panic!("submission was not accepted");
    };
    let result = assert_ok!(handle.await);
    assert!(matches!(assert_err!(result), AgentError::NotFound(_)));

    assert!(h.control.job_updates().is_empty());
    assert_eq!(manager.in_flight_count(), 0);
}

#[tokio::test]
async fn test_wait_idle_follows_running_jobs() {
    let h = reboot_harness();
    let manager = Arc::new(JobManager::new(Arc::new(h.context(RunMode::Container, false))));

    let mut idle = task::spawn(manager.wait_idle());
    assert_ready!(idle.poll());

    let Submission::Accepted(handle) = manager.submit("job/1") else {
        panic!("submission was not accepted");
    };
    let mut idle = task::spawn(manager.wait_idle());
    assert_pending!(idle.poll());

    assert_ok!(assert_ok!(handle.await));
    assert!(idle.is_woken());
    assert_ready!(idle.poll());

    // the terminal update was written before the wait resolved
    let last = h.control.job_updates().last().unwrap().1.clone();
    assert_eq!(last.state, Some(JobState::Success));
}

#[tokio::test]
async fn test_job_worker_dispatches_and_deduplicates() {
    let h = reboot_harness();
    let manager = Arc::new(JobManager::new(Arc::new(h.context(RunMode::Container, false))));

    let (tx, rx) = mpsc::channel(4);
    tx.send("job/1".to_string()).await.unwrap();
    tx.send("job/1".to_string()).await.unwrap();
    drop(tx);

    // returns once the queue is drained and closed
    jobs::run(manager.clone(), rx, Box::pin(std::future::pending::<()>())).await;
    manager.wait_idle().await;

    assert_eq!(h.control.get_job_calls.load(Ordering::SeqCst), 1);
    let last = h.control.job_updates().last().unwrap().1.clone();
    assert_eq!(last.state, Some(JobState::Success));
}

#[tokio::test]
async fn test_job_worker_shutdown() {
    let h = reboot_harness();
    let manager = Arc::new(JobManager::new(Arc::new(h.context(RunMode::Container, false))));
    let (_tx, rx) = mpsc::channel::<String>(4);

    jobs::run(manager, rx, Box::pin(async {})).await;
    assert!(h.control.job_updates().is_empty());
}

#[tokio::test]
async fn test_poller_feeds_intake() {
    let control = FakeControlPlane::new().with_pending(&["job/1", "job/2"]);
    let (tx, mut rx) = mpsc::channel(8);
    let options = poller::Options {
        agent_id: "agent/edge-1".to_string(),
        interval: Duration::from_millis(5),
        initial_delay: Duration::ZERO,
        ..Default::default()
    };

    let receive = async move {
        let first = rx.recv().await;
        let second = rx.recv().await;
        (first, second)
    };

    // the poller stops on its own once the receiver is dropped
    let (_, (first, second)) = tokio::join!(
        poller::run(
            &options,
            &control,
            tx,
            tokio::time::sleep,
            Box::pin(std::future::pending::<()>()),
        ),
        receive
    );

    assert_eq!(first.as_deref(), Some("job/1"));
    assert_eq!(second.as_deref(), Some("job/2"));
}

#[tokio::test]
async fn test_poller_backs_off_after_failures() {
    let control = FakeControlPlane::new()
        .failing_polls(4)
        .with_pending(&["job/1"]);
    let (tx, mut rx) = mpsc::channel(8);
    let options = poller::Options {
        agent_id: "agent/edge-1".to_string(),
        interval: Duration::from_secs(3),
        initial_delay: Duration::ZERO,
        backoff: Backoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(4),
            factor: 2,
        },
    };

    // records the requested waits without sleeping
    let waits = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let waits = waits.clone();
        move |wait: Duration| {
            waits.lock().unwrap().push(wait);
            tokio::task::yield_now()
        }
    };

    let (_, first) = tokio::join!(
        poller::run(
            &options,
            &control,
            tx,
            record,
            Box::pin(std::future::pending::<()>()),
        ),
        async move {
            let first = rx.recv().await;
            drop(rx);
            first
        }
    );

    assert_eq!(first.as_deref(), Some("job/1"));
    let waits = waits.lock().unwrap().clone();
    assert_eq!(
        waits[..6],
        [
            Duration::ZERO,
            Duration::from_secs(3),
            Duration::from_secs(3),
            Duration::from_secs(4),
            Duration::from_secs(4),
            Duration::from_secs(3),
        ]
    );
}
