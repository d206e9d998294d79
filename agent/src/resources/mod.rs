//! Atomic image, container, volume and network actions
//!
//! Every action of a batch is executed independently and answered with a
//! [`ResourceActionResponse`]; engine failures become response codes.

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::{ContainerEngine, EngineError};
use crate::errors::AgentError;
use crate::models::resource::{ResourceAction, ResourceActionResponse};

type Operation =
    for<'a> fn(&'a dyn ContainerEngine, &'a str) -> BoxFuture<'a, Result<String, EngineError>>;

const RESOURCES: &[&str] = &["image", "container", "volume", "network"];

const OPERATIONS: &[(&str, &str, Operation)] = &[
    ("pull", "image", pull_image),
    ("remove", "image", remove_image),
    ("remove", "container", remove_container),
    ("remove", "volume", remove_volume),
    ("remove", "network", remove_network),
];

/// Turn the last line of a pull stream into a response message
pub fn classify_pull(last_status: Option<&str>) -> String {
    let status = last_status.map(str::to_lowercase).unwrap_or_default();
    if status.contains("downloaded newer image") {
        "downloaded newer image".to_string()
    } else if status.contains("image is up to date") {
        "image is up to date".to_string()
    } else {
        "pulled".to_string()
    }
}

fn pull_image<'a>(
    engine: &'a dyn ContainerEngine,
    id: &'a str,
) -> BoxFuture<'a, Result<String, EngineError>> {
    Box::pin(async move {
        let last = engine.pull_image(id).await?;
        Ok(classify_pull(last.as_deref()))
    })
}

fn remove_image<'a>(
    engine: &'a dyn ContainerEngine,
    id: &'a str,
) -> BoxFuture<'a, Result<String, EngineError>> {
    Box::pin(async move {
        engine.remove_image(id).await?;
        Ok(format!("image {} removed", id))
    })
}

fn remove_container<'a>(
    engine: &'a dyn ContainerEngine,
    id: &'a str,
) -> BoxFuture<'a, Result<String, EngineError>> {
    Box::pin(async move {
        engine.remove_container(id).await?;
        Ok(format!("container {} removed", id))
    })
}

fn remove_volume<'a>(
    engine: &'a dyn ContainerEngine,
    id: &'a str,
) -> BoxFuture<'a, Result<String, EngineError>> {
    Box::pin(async move {
        engine.remove_volume(id).await?;
        Ok(format!("volume {} removed", id))
    })
}

fn remove_network<'a>(
    engine: &'a dyn ContainerEngine,
    id: &'a str,
) -> BoxFuture<'a, Result<String, EngineError>> {
    Box::pin(async move {
        engine.remove_network(id).await?;
        Ok(format!("network {} removed", id))
    })
}

fn lookup(action: &str, resource: &str) -> Result<Operation, ResourceActionResponse> {
    if !RESOURCES.contains(&resource) {
        return Err(ResourceActionResponse::new(
            404,
            format!("unknown resource type {}", resource),
        ));
    }

    OPERATIONS
        .iter()
        .find(|(a, r, _)| *a == action && *r == resource)
        .map(|(_, _, op)| *op)
        .ok_or_else(|| {
            ResourceActionResponse::new(
                501,
                format!("action {} not implemented for {}", action, resource),
            )
        })
}

/// Execute one action
pub async fn execute(engine: &dyn ContainerEngine, action: &ResourceAction) -> ResourceActionResponse {
    let operation = match lookup(&action.action, &action.resource) {
        Ok(operation) => operation,
        Err(response) => return response,
    };

    match operation(engine, action.id.as_str()).await {
        Ok(message) => ResourceActionResponse::new(200, message),
        Err(e) => {
            warn!(
                "{} {} {} failed: {}",
                action.action, action.resource, action.id, e
            );
            ResourceActionResponse::new(e.status_code(), e.to_string())
        }
    }
}

/// Execute a batch in order, one response per action
pub async fn handle(
    engine: &dyn ContainerEngine,
    actions: &[ResourceAction],
) -> Vec<ResourceActionResponse> {
    let mut responses = Vec::with_capacity(actions.len());
    for action in actions {
        debug!("Resource action {} {} {}", action.action, action.resource, action.id);
        responses.push(execute(engine, action).await);
    }
    responses
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    List(Vec<ResourceAction>),
    Docker { docker: Vec<ResourceAction> },
}

/// Decode a job payload into a batch, either a plain list or `{"docker": [...]}`
pub fn parse_payload(payload: Option<Value>) -> Result<Vec<ResourceAction>, AgentError> {
    let payload =
        payload.ok_or_else(|| AgentError::PayloadError("missing resource actions".to_string()))?;

    match serde_json::from_value::<Batch>(payload) {
        Ok(Batch::List(actions)) | Ok(Batch::Docker { docker: actions }) => Ok(actions),
        Err(e) => Err(AgentError::PayloadError(format!(
            "expected a list of resource actions: {}",
            e
        ))),
    }
}

/// One output line per action
pub fn summarize(actions: &[ResourceAction], responses: &[ResourceActionResponse]) -> String {
    actions
        .iter()
        .zip(responses)
        .map(|(action, response)| {
            format!(
                "{} {} {}: {} {}",
                action.action, action.resource, action.id, response.return_code, response.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
