//! Job action dispatch
//!
//! [`resolve`] maps an action name to an [`ActionKind`]. Initializing the
//! kind builds its executor and yields an [`Action`], the only thing that
//! can be executed. Executing consumes the action and always closes its
//! executor.

use std::fmt;
use std::sync::Arc;

use api_models::models::Job;
use tracing::info;

use crate::deploy::state_machine::DeploymentStateMachine;
use crate::deploy::{select_deployer, select_rebooter, ExecutorContext, Rebooter};
use crate::engine::ContainerEngine;
use crate::errors::AgentError;
use crate::models::resource::ResourceAction;
use crate::resources;

/// Known action names and the action they resolve to
pub const ACTION_NAMES: &[(&str, ActionKind)] = &[
    ("reboot", ActionKind::Reboot),
    ("start_deployment", ActionKind::DeploymentStart),
    ("stop_deployment", ActionKind::DeploymentStop),
    ("update_deployment", ActionKind::DeploymentUpdate),
    ("deployment_state", ActionKind::DeploymentState),
    ("deployment_state_10", ActionKind::DeploymentState),
    ("deployment_state_60", ActionKind::DeploymentState),
    ("resource_actions", ActionKind::ResourceActions),
];

/// An action resolved from its name, not yet initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Reboot,
    DeploymentStart,
    DeploymentStop,
    DeploymentUpdate,
    DeploymentState,
    ResourceActions,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Reboot => "reboot",
            ActionKind::DeploymentStart => "deployment start",
            ActionKind::DeploymentStop => "deployment stop",
            ActionKind::DeploymentUpdate => "deployment update",
            ActionKind::DeploymentState => "deployment state",
            ActionKind::ResourceActions => "resource actions",
        };
        f.write_str(name)
    }
}

/// Map an action name to its kind
pub fn resolve(name: &str) -> Result<ActionKind, AgentError> {
    ACTION_NAMES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| AgentError::NotImplementedAction(format!("unknown action {}", name)))
}

impl ActionKind {
    /// Build the executor for `job`; on error nothing is left open
    pub async fn init(self, ctx: &ExecutorContext, job: &Job) -> Result<Action, AgentError> {
        match self {
            ActionKind::Reboot => {
                let rebooter = select_rebooter(ctx.run_mode, ctx.super_user)?.build(ctx)?;
                Ok(Action::Reboot(rebooter))
            }
            ActionKind::DeploymentStart => Ok(Action::DeploymentStart(init_deployment(ctx, job).await?)),
            ActionKind::DeploymentStop => Ok(Action::DeploymentStop(init_deployment(ctx, job).await?)),
            ActionKind::DeploymentUpdate => {
                Ok(Action::DeploymentUpdate(init_deployment(ctx, job).await?))
            }
            ActionKind::DeploymentState => Ok(Action::DeploymentState(init_deployment(ctx, job).await?)),
            ActionKind::ResourceActions => {
                let payload = job
                    .payload_json()
                    .map_err(|e| AgentError::PayloadError(e.to_string()))?;
                let actions = resources::parse_payload(payload)?;
                let engine = ctx.engines.connect()?;
                Ok(Action::ResourceActions { engine, actions })
            }
        }
    }
}

async fn init_deployment(
    ctx: &ExecutorContext,
    job: &Job,
) -> Result<DeploymentStateMachine, AgentError> {
    let deployment_id = job.target_href().ok_or_else(|| {
        AgentError::PayloadError(format!("job {} has no target deployment", job.id))
    })?;

    let deployment = ctx.control.get_deployment(deployment_id).await?;
    let deployer = select_deployer(&deployment.module)?
        .build(ctx, &deployment)
        .await?;

    Ok(DeploymentStateMachine::new(
        ctx.control.clone(),
        ctx.host.clone(),
        deployment,
        deployer,
    ))
}

/// An initialized action owning its executor
pub enum Action {
    Reboot(Box<dyn Rebooter>),
    DeploymentStart(DeploymentStateMachine),
    DeploymentStop(DeploymentStateMachine),
    DeploymentUpdate(DeploymentStateMachine),
    DeploymentState(DeploymentStateMachine),
    ResourceActions {
        engine: Arc<dyn ContainerEngine>,
        actions: Vec<ResourceAction>,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Reboot(_) => ActionKind::Reboot,
            Action::DeploymentStart(_) => ActionKind::DeploymentStart,
            Action::DeploymentStop(_) => ActionKind::DeploymentStop,
            Action::DeploymentUpdate(_) => ActionKind::DeploymentUpdate,
            Action::DeploymentState(_) => ActionKind::DeploymentState,
            Action::ResourceActions { .. } => ActionKind::ResourceActions,
        }
    }

    /// Run the action, returning the job output text
    pub async fn execute(self) -> Result<String, AgentError> {
        info!("Executing {}", self.kind());

        match self {
            Action::Reboot(rebooter) => {
                let result = rebooter.reboot().await;
                rebooter.close().await;
                result
            }
            Action::DeploymentStart(mut machine) => {
                let result = machine.start().await;
                machine.close().await;
                result
            }
            Action::DeploymentStop(mut machine) => {
                let result = machine.stop().await;
                machine.close().await;
                result
            }
            Action::DeploymentUpdate(mut machine) => {
                let result = machine.update().await;
                machine.close().await;
                result
            }
            Action::DeploymentState(machine) => {
                let result = machine.services().await;
                machine.close().await;
                result
            }
            Action::ResourceActions { engine, actions } => {
                let responses = resources::handle(engine.as_ref(), &actions).await;
                engine.close().await;

                let summary = resources::summarize(&actions, &responses);
                if responses.iter().all(|r| r.success) {
                    Ok(summary)
                } else {
                    Err(AgentError::ResourceActionsFailed(summary))
                }
            }
        }
    }
}
