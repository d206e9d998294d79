//! Swarm stack deployment executor

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use api_models::models::{Deployment, ModuleFile};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::deploy::command::{run_checked, CommandRunner, CommandSpec};
use crate::deploy::compose::COMPOSE_FILE;
use crate::deploy::staging::{expand_env, project_name, StagingDir};
use crate::deploy::{Deployer, ExecutorContext, ExecutorSettings};
use crate::engine::{ContainerEngine, ServiceSummary};
use crate::errors::AgentError;
use crate::models::service::{port_map, DeploymentService};

fn to_service(namespace: &str, service: ServiceSummary) -> DeploymentService {
    let prefix = format!("{}_", namespace);
    DeploymentService {
        node_id: service
            .name
            .strip_prefix(&prefix)
            .unwrap_or(&service.name)
            .to_string(),
        service_id: service.id,
        name: service.name.clone(),
        image: service.image,
        state: service.state,
        status: service.status,
        ports: port_map(&service.ports),
    }
}

/// Whether a module file name resolves to the generated stack file
fn shadows_stack_file(name: &str) -> bool {
    let normalized: PathBuf = Path::new(name)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    normalized == Path::new(COMPOSE_FILE)
}

/// Deploys a module as a swarm stack with `docker stack`
pub struct StackDeployer {
    namespace: String,
    content: String,
    environment: HashMap<String, String>,
    files: Vec<ModuleFile>,
    engine: Arc<dyn ContainerEngine>,
    commands: Arc<dyn CommandRunner>,
    settings: ExecutorSettings,
}

impl StackDeployer {
    /// Build the executor; the node must be an active swarm manager
    pub async fn new(ctx: &ExecutorContext, deployment: &Deployment) -> Result<Self, AgentError> {
        let content = deployment
            .module
            .content
            .docker_compose
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::ComposeContentUnavailable(deployment.id.clone()))?;

        let engine = ctx.engines.connect()?;
        match engine.swarm_manager().await {
            Ok(true) => {}
            Ok(false) => {
                engine.close().await;
                return Err(AgentError::DeployError(
                    "this node is not an active swarm manager".to_string(),
                ));
            }
            Err(e) => {
                engine.close().await;
                return Err(e.into());
            }
        }

        Ok(Self {
            namespace: project_name(&deployment.id),
            content,
            environment: deployment.environment().into_iter().collect(),
            files: deployment.module.content.files.clone(),
            engine,
            commands: ctx.commands.clone(),
            settings: ctx.settings.clone(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn deploy(&self, staging: &StagingDir) -> Result<String, AgentError> {
        if let Some(file) = self.files.iter().find(|f| shadows_stack_file(&f.file_name)) {
            return Err(AgentError::DeployError(format!(
                "module file {} would replace the stack file",
                file.file_name
            )));
        }

        let stack_file = staging
            .write_file(COMPOSE_FILE, &expand_env(&self.content, &self.environment))
            .await?;
        for file in &self.files {
            staging.write_file(&file.file_name, &file.file_content).await?;
        }

        let stack_file = stack_file.display().to_string();
        let deploy = CommandSpec::new(
            &self.settings.docker_program,
            [
                "stack",
                "deploy",
                "--resolve-image",
                "always",
                "-c",
                stack_file.as_str(),
                self.namespace.as_str(),
            ],
            self.settings.command_timeout,
        )
        .current_dir(staging.path());

        Ok(run_checked(self.commands.as_ref(), &deploy).await?.combined())
    }
}

#[async_trait]
impl Deployer for StackDeployer {
    async fn start(&self) -> Result<String, AgentError> {
        info!("Deploying stack {}", self.namespace);

        let staging = StagingDir::create(&self.settings.staging_root, &self.namespace).await?;
        let result = self.deploy(&staging).await;
        if let Err(e) = staging.remove().await {
            warn!("Failed to remove staging directory for {}: {}", self.namespace, e);
        }
        result
    }

    async fn stop(&self) -> Result<String, AgentError> {
        info!("Removing stack {}", self.namespace);

        let remove = CommandSpec::new(
            &self.settings.docker_program,
            ["stack", "rm", self.namespace.as_str()],
            self.settings.stack_remove_timeout,
        );
        match run_checked(self.commands.as_ref(), &remove).await {
            Ok(output) => Ok(output.combined()),
            Err(AgentError::CommandTimeout(deadline, _)) => {
                warn!(
                    "Stack {} removal still running after {:?}, leaving it to the engine",
                    self.namespace, deadline
                );
                Ok(format!("Removal of stack {} in progress", self.namespace))
            }
            Err(e) => Err(e),
        }
    }

    async fn state(&self) -> Result<Vec<DeploymentService>, AgentError> {
        let services = self.engine.list_stack_services(&self.namespace).await?;
        let mut services: Vec<DeploymentService> = services
            .into_iter()
            .map(|s| to_service(&self.namespace, s))
            .collect();
        services.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(services)
    }

    async fn close(&self) {
        self.engine.close().await;
    }
}
