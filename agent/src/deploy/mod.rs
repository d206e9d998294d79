//! Executor strategy layer
//!
//! Deployers and rebooters are picked by pure selection functions and built
//! against an [`ExecutorContext`] holding every collaborator they need.

pub mod command;
pub mod compose;
pub mod fsm;
pub mod reboot;
pub mod stack;
pub mod staging;
pub mod state_machine;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use api_models::models::{
    Deployment, Module, COMPATIBILITY_DOCKER_COMPOSE, COMPATIBILITY_SWARM, SUBTYPE_APPLICATION,
};
use async_trait::async_trait;

use crate::deploy::command::CommandRunner;
use crate::engine::EngineConnector;
use crate::errors::AgentError;
use crate::host::{HostProbe, RunMode};
use crate::http::control_plane::ControlPlane;
use crate::models::service::DeploymentService;

/// Tunables shared by the CLI-driven executors
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Root under which per-project staging directories are created
    pub staging_root: PathBuf,

    /// Engine CLI binary
    pub docker_program: String,

    /// Deadline for engine CLI calls
    pub command_timeout: Duration,

    /// Deadline for `stack rm`, expiry means removal is still in progress
    pub stack_remove_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir().join("fleetagent"),
            docker_program: "docker".to_string(),
            command_timeout: Duration::from_secs(600),
            stack_remove_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything an action needs to build and run its executor
pub struct ExecutorContext {
    pub control: Arc<dyn ControlPlane>,
    pub engines: Arc<dyn EngineConnector>,
    pub commands: Arc<dyn CommandRunner>,
    pub host: Arc<dyn HostProbe>,
    pub run_mode: RunMode,
    pub super_user: bool,
    pub settings: ExecutorSettings,
}

/// Start, stop and inspect one deployment on a backend
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Bring the deployment up, returning the backend output
    async fn start(&self) -> Result<String, AgentError>;

    /// Tear the deployment down
    async fn stop(&self) -> Result<String, AgentError>;

    /// Current services of the deployment
    async fn state(&self) -> Result<Vec<DeploymentService>, AgentError>;

    /// Release the engine client
    async fn close(&self);
}

/// Host power control
#[async_trait]
pub trait Rebooter: Send + Sync {
    async fn reboot(&self) -> Result<String, AgentError>;

    async fn close(&self);
}

/// Deployment backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployerKind {
    Compose,
    Stack,
}

/// Pick the deployment backend from the module subtype and compatibility
pub fn select_deployer(module: &Module) -> Result<DeployerKind, AgentError> {
    match (module.subtype.as_str(), module.compatibility.as_deref()) {
        (SUBTYPE_APPLICATION, Some(COMPATIBILITY_DOCKER_COMPOSE)) => Ok(DeployerKind::Compose),
        (SUBTYPE_APPLICATION, Some(COMPATIBILITY_SWARM)) => Ok(DeployerKind::Stack),
        (subtype, compatibility) => Err(AgentError::NotImplementedAction(format!(
            "no deployer for module {} with compatibility {}",
            subtype,
            compatibility.unwrap_or("none")
        ))),
    }
}

impl DeployerKind {
    /// Build the executor, opening its engine client
    pub async fn build(
        self,
        ctx: &ExecutorContext,
        deployment: &Deployment,
    ) -> Result<Box<dyn Deployer>, AgentError> {
        match self {
            DeployerKind::Compose => Ok(Box::new(compose::ComposeDeployer::new(ctx, deployment)?)),
            DeployerKind::Stack => Ok(Box::new(stack::StackDeployer::new(ctx, deployment).await?)),
        }
    }
}

/// Reboot backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebooterKind {
    Host,
    Docker,
    Kubernetes,
}

/// Pick the reboot backend; host reboots need super-user identity
pub fn select_rebooter(run_mode: RunMode, super_user: bool) -> Result<RebooterKind, AgentError> {
    match run_mode {
        RunMode::Host if super_user => Ok(RebooterKind::Host),
        RunMode::Host => Err(AgentError::PermissionRequired(
            "rebooting the host requires super-user identity".to_string(),
        )),
        RunMode::Container => Ok(RebooterKind::Docker),
        RunMode::Pod => Ok(RebooterKind::Kubernetes),
    }
}

impl RebooterKind {
    pub fn build(self, ctx: &ExecutorContext) -> Result<Box<dyn Rebooter>, AgentError> {
        match self {
            RebooterKind::Host => Ok(Box::new(reboot::HostRebooter::new(ctx))),
            RebooterKind::Docker => Ok(Box::new(reboot::DockerRebooter::new(ctx)?)),
            RebooterKind::Kubernetes => Ok(Box::new(reboot::KubernetesRebooter)),
        }
    }
}
