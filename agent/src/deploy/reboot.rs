//! Host reboot executors

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::deploy::command::{run_checked, CommandRunner, CommandSpec};
use crate::deploy::{ExecutorContext, Rebooter};
use crate::engine::{ContainerEngine, HelperContainer};
use crate::errors::AgentError;

/// Image of the helper container that triggers the reboot from the engine side
pub const REBOOT_HELPER_IMAGE: &str = "alpine:3.18";

/// Delay before the helper container triggers the reboot, leaves time to report the job
const REBOOT_HELPER_DELAY_SECS: u64 = 10;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Reboots the machine the agent runs on directly
pub struct HostRebooter {
    commands: Arc<dyn CommandRunner>,
}

impl HostRebooter {
    pub fn new(ctx: &ExecutorContext) -> Self {
        Self {
            commands: ctx.commands.clone(),
        }
    }
}

#[async_trait]
impl Rebooter for HostRebooter {
    async fn reboot(&self) -> Result<String, AgentError> {
        info!("Scheduling host reboot");
        let spec = CommandSpec::new("shutdown", ["-r", "+1"], SHUTDOWN_TIMEOUT);
        let output = run_checked(self.commands.as_ref(), &spec).await?.combined();
        if output.is_empty() {
            return Ok("Reboot scheduled in 1 minute".to_string());
        }
        Ok(output)
    }

    async fn close(&self) {}
}

/// Reboots the host from a privileged helper container when the agent is containerized
pub struct DockerRebooter {
    engine: Arc<dyn ContainerEngine>,
}

impl DockerRebooter {
    pub fn new(ctx: &ExecutorContext) -> Result<Self, AgentError> {
        Ok(Self {
            engine: ctx.engines.connect()?,
        })
    }

    pub fn helper() -> HelperContainer {
        HelperContainer {
            name: format!("fleetagent-reboot-{}", uuid::Uuid::new_v4().simple()),
            image: REBOOT_HELPER_IMAGE.to_string(),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("sleep {} && echo b > /sysrq", REBOOT_HELPER_DELAY_SECS),
            ],
            binds: vec!["/proc/sysrq-trigger:/sysrq".to_string()],
        }
    }
}

#[async_trait]
impl Rebooter for DockerRebooter {
    async fn reboot(&self) -> Result<String, AgentError> {
        let helper = Self::helper();
        info!("Starting reboot helper container {}", helper.name);
        let id = self.engine.run_helper(&helper).await?;
        Ok(format!(
            "Reboot in {}s triggered by helper container {}",
            REBOOT_HELPER_DELAY_SECS, id
        ))
    }

    async fn close(&self) {
        self.engine.close().await;
    }
}

/// Placeholder for orchestrated pods, reboots are not supported there yet
pub struct KubernetesRebooter;

#[async_trait]
impl Rebooter for KubernetesRebooter {
    async fn reboot(&self) -> Result<String, AgentError> {
        Err(AgentError::NotImplementedAction(
            "reboot is not supported in pod run mode".to_string(),
        ))
    }

    async fn close(&self) {}
}
