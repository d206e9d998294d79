//! Action dispatch and executor selection tests

use std::sync::Arc;

use api_models::models::{JobState, JobUpdate};
use fleetagent::errors::AgentError;
use fleetagent::host::RunMode;
use fleetagent::jobs::manager::JobManager;

use crate::fakes::*;

fn manager(h: &Harness, run_mode: RunMode, super_user: bool) -> Arc<JobManager> {
    Arc::new(JobManager::new(Arc::new(h.context(run_mode, super_user))))
}

#[tokio::test]
async fn test_unknown_action_fails_job() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "cluster_join", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::NotImplementedAction(_))));

    let updates = h.control.job_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].1, JobUpdate::running(10));
    assert_eq!(updates[1].1.state, Some(JobState::Failed));
    assert_eq!(updates[1].1.return_code, Some(1));
    assert!(updates[1]
        .1
        .status_message
        .as_deref()
        .unwrap_or_default()
        .contains("cluster_join"));
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn test_kubernetes_module_not_implemented() {
    let h = Harness::new(
        FakeControlPlane::new()
            .with_deployment(deployment(
                "deployment/k8s",
                "application_kubernetes",
                None,
                Some(COMPOSE_APP),
            ))
            .with_job(job("job/1", "start_deployment", Some("deployment/k8s"))),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::NotImplementedAction(_))));
    assert_eq!(h.connector.connects(), 0);
    assert!(h.control.states().is_empty());
}

#[tokio::test]
async fn test_missing_compose_content() {
    let h = Harness::new(
        FakeControlPlane::new()
            .with_deployment(deployment(
                "deployment/empty",
                "application",
                Some("docker-compose"),
                None,
            ))
            .with_job(job("job/1", "start_deployment", Some("deployment/empty"))),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::ComposeContentUnavailable(_))));
    assert_eq!(h.connector.connects(), 0);
    assert!(h.control.states().is_empty());
}

#[tokio::test]
async fn test_stack_requires_swarm_manager() {
    let h = Harness::new(
        FakeControlPlane::new()
            .with_deployment(deployment(
                "deployment/app-1",
                "application",
                Some("swarm"),
                Some(COMPOSE_APP),
            ))
            .with_job(job("job/1", "start_deployment", Some("deployment/app-1"))),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::DeployError(_))));

    // the engine opened for the swarm check is released
    assert_eq!(h.connector.connects(), 1);
    assert_eq!(h.engine().closes(), 1);
    assert!(h.control.states().is_empty());
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_deployment_job_without_target() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "stop_deployment", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::PayloadError(_))));
}

#[tokio::test]
async fn test_host_reboot_requires_super_user() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "reboot", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Host, false).process("job/1").await;
    assert!(matches!(result, Err(AgentError::PermissionRequired(_))));

    assert!(h.runner.commands().is_empty());
    assert!(h.control.states().is_empty());
    assert!(h.control.parameters().is_empty());
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn test_host_reboot() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "reboot", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let output = manager(&h, RunMode::Host, true).process("job/1").await.unwrap();
    assert_eq!(output, "ran -r +1");
    assert_eq!(h.runner.commands(), vec!["shutdown -r +1".to_string()]);
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn test_container_reboot_uses_helper() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "reboot", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let output = manager(&h, RunMode::Container, false)
        .process("job/1")
        .await
        .unwrap();
    assert!(output.contains("helper-1"));

    let helpers = h.engine().helpers.lock().unwrap().clone();
    assert_eq!(helpers.len(), 1);
    assert_eq!(helpers[0].binds, vec!["/proc/sysrq-trigger:/sysrq".to_string()]);
    assert_eq!(h.engine().closes(), 1);
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn test_pod_reboot_not_implemented() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(job("job/1", "reboot", None)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );

    let result = manager(&h, RunMode::Pod, true).process("job/1").await;
    assert!(matches!(result, Err(AgentError::NotImplementedAction(_))));
    assert_eq!(h.connector.connects(), 0);
}
