//! Local container engine client
//!
//! The executors talk to the engine through [`ContainerEngine`] so that the
//! strategy layer and the resource handler can run against fakes in tests.
//! [`docker::DockerEngine`] is the bollard-backed implementation.

pub mod docker;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Engine-level failure, classified the way the engine API reports it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("engine client closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// HTTP-like status code reported to the control plane
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InvalidParameter(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::Conflict(_) => 409,
            EngineError::Closed | EngineError::Other(_) => 500,
        }
    }
}

/// Published port of a container or service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub protocol: String,
    pub target_port: u16,
    pub published_port: u16,
}

/// Container as listed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PublishedPort>,
}

/// Swarm service with the state of its most recent task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: Vec<PublishedPort>,
}

/// Short-lived privileged container used for host operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperContainer {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub binds: Vec<String>,
}

/// Container engine operations needed by the executors
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Pull an image, returning the last status line of the pull stream
    async fn pull_image(&self, image: &str) -> Result<Option<String>, EngineError>;

    async fn remove_image(&self, image: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;

    async fn remove_network(&self, id: &str) -> Result<(), EngineError>;

    /// List all containers carrying `label=value`
    async fn list_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError>;

    /// List services of a stack namespace
    async fn list_stack_services(&self, namespace: &str)
        -> Result<Vec<ServiceSummary>, EngineError>;

    /// Whether this node is an active swarm manager
    async fn swarm_manager(&self) -> Result<bool, EngineError>;

    /// Pull, create and start a privileged helper container
    async fn run_helper(&self, helper: &HelperContainer) -> Result<String, EngineError>;

    /// Release the underlying client, later calls fail with [`EngineError::Closed`]
    async fn close(&self);
}

/// Opens one engine client per executor
pub trait EngineConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError>;
}
