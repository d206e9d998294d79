//! Resource action handler tests

use std::sync::Arc;

use api_models::models::JobState;
use fleetagent::errors::AgentError;
use fleetagent::host::RunMode;
use fleetagent::jobs::manager::JobManager;
use fleetagent::models::resource::ResourceAction;
use fleetagent::resources;

use crate::fakes::*;

#[tokio::test]
async fn test_pull_and_remove_missing_container() {
    let engine = FakeEngine::default();
    let actions = vec![
        ResourceAction::new("pull", "image", "alpine:3.18"),
        ResourceAction::new("remove", "container", "ghost-id"),
    ];

    let responses = resources::handle(&engine, &actions).await;

    assert_eq!(responses.len(), 2);
    assert!(responses[0].success);
    assert_eq!(responses[0].return_code, 200);
    assert_eq!(responses[0].message, "downloaded newer image");
    assert!(!responses[1].success);
    assert_eq!(responses[1].return_code, 404);
}

#[tokio::test]
async fn test_response_codes() {
    let engine = FakeEngine::default();
    engine.containers.lock().unwrap().insert("c1".to_string());

    let actions = vec![
        ResourceAction::new("pull", "image", "alpine"),
        ResourceAction::new("remove", "container", "c1"),
        ResourceAction::new("remove", "image", "nginx:1.25"),
        ResourceAction::new("remove", "volume", ""),
        ResourceAction::new("remove", "network", "edge"),
        ResourceAction::new("pull", "volume", "data"),
        ResourceAction::new("prune", "image", "nginx"),
        ResourceAction::new("remove", "secret", "token"),
        ResourceAction::new("pull", "image", "missing/app:1"),
    ];

    let responses = resources::handle(&engine, &actions).await;
    let codes: Vec<u16> = responses.iter().map(|r| r.return_code).collect();
    assert_eq!(codes, vec![200, 200, 409, 400, 500, 501, 501, 404, 404]);
    assert_eq!(responses[0].message, "image is up to date");

    assert_eq!(responses.len(), actions.len());
    for response in &responses {
        assert_eq!(response.success, response.return_code < 400);
    }
}

fn resource_job(payload: serde_json::Value) -> api_models::models::Job {
    let mut job = job("job/7", "resource_actions", None);
    job.payload = Some(payload);
    job
}

#[tokio::test]
async fn test_resource_job_success() {
    let payload = serde_json::Value::String(
        r#"{"docker": [{"action": "pull", "resource": "image", "id": "alpine:3.18"},
                       {"action": "remove", "resource": "volume", "id": "data"}]}"#
            .to_string(),
    );
    let h = Harness::new(
        FakeControlPlane::new().with_job(resource_job(payload)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );
    let manager = JobManager::new(Arc::new(h.context(RunMode::Host, false)));

    let output = manager.process("job/7").await.unwrap();
    assert_eq!(
        output,
        "pull image alpine:3.18: 200 downloaded newer image\nremove volume data: 200 volume data removed"
    );
    assert_eq!(h.engine().closes(), 1);

    let updates = h.control.job_updates();
    let last = &updates.last().unwrap().1;
    assert_eq!(last.state, Some(JobState::Success));
    assert_eq!(last.progress, Some(100));
}

#[tokio::test]
async fn test_resource_job_partial_failure() {
    let payload = serde_json::json!([
        {"action": "pull", "resource": "image", "id": "alpine:3.18"},
        {"action": "remove", "resource": "container", "id": "ghost-id"}
    ]);
    let h = Harness::new(
        FakeControlPlane::new().with_job(resource_job(payload)),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );
    let manager = JobManager::new(Arc::new(h.context(RunMode::Host, false)));

    let result = manager.process("job/7").await;
    match result {
        Err(AgentError::ResourceActionsFailed(summary)) => {
            assert_eq!(summary.lines().count(), 2);
            assert!(summary.contains("remove container ghost-id: 404"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.engine().closes(), 1);

    let last = h.control.job_updates().last().unwrap().1.clone();
    assert_eq!(last.state, Some(JobState::Failed));
    assert_eq!(last.return_code, Some(1));
}

#[tokio::test]
async fn test_resource_job_bad_payload() {
    let h = Harness::new(
        FakeControlPlane::new().with_job(resource_job(serde_json::json!({"k8s": []}))),
        FakeEngine::default(),
        FakeCommandRunner::default(),
    );
    let manager = JobManager::new(Arc::new(h.context(RunMode::Host, false)));

    let result = manager.process("job/7").await;
    assert!(matches!(result, Err(AgentError::PayloadError(_))));
    assert_eq!(h.connector.connects(), 0);
}
