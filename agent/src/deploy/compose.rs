//! Docker Compose deployment executor

use std::path::Path;
use std::sync::Arc;

use api_models::models::Deployment;
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::deploy::command::{run_checked, CommandRunner, CommandSpec};
use crate::deploy::staging::{project_name, StagingDir};
use crate::deploy::{Deployer, ExecutorContext, ExecutorSettings};
use crate::engine::{ContainerEngine, ContainerSummary};
use crate::errors::AgentError;
use crate::models::service::{port_map, DeploymentService};

pub const COMPOSE_FILE: &str = "docker-compose.yml";
const ENV_FILE: &str = ".env";

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
const VERSION_LABEL: &str = "com.docker.compose.version";
const WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";
const CONFIG_FILES_LABEL: &str = "com.docker.compose.project.config_files";
const ONEOFF_LABEL: &str = "com.docker.compose.oneoff";

/// Compose version advertised in the provenance labels
pub const COMPOSE_VERSION: &str = "2.29.1";

/// Add compose provenance labels to every service of a compose file.
///
/// Labels may be declared as a mapping or as a `KEY=VALUE` list, both are
/// preserved and the provenance keys override existing entries.
pub fn inject_labels(
    content: &str,
    project: &str,
    working_dir: &Path,
    config_file: &Path,
) -> Result<String, AgentError> {
    let mut doc: Value = serde_yaml::from_str(content)?;
    let services = doc
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| AgentError::DeployError("compose file declares no services".to_string()))?;

    for (name, service) in services.iter_mut() {
        let Some(name) = name.as_str() else {
            continue;
        };
        if service.is_null() {
            *service = Value::Mapping(Mapping::new());
        }
        let Some(service) = service.as_mapping_mut() else {
            continue;
        };

        let labels = [
            (PROJECT_LABEL, project.to_string()),
            (SERVICE_LABEL, name.to_string()),
            (VERSION_LABEL, COMPOSE_VERSION.to_string()),
            (WORKING_DIR_LABEL, working_dir.display().to_string()),
            (CONFIG_FILES_LABEL, config_file.display().to_string()),
            (ONEOFF_LABEL, "False".to_string()),
        ];

        match service.get_mut("labels") {
            Some(Value::Sequence(entries)) => {
                for (key, value) in labels {
                    entries.retain(|entry| {
                        entry.as_str().and_then(|e| e.split('=').next()) != Some(key)
                    });
                    entries.push(Value::String(format!("{}={}", key, value)));
                }
            }
            Some(Value::Mapping(entries)) => {
                for (key, value) in labels {
                    entries.insert(Value::String(key.to_string()), Value::String(value));
                }
            }
            _ => {
                let entries = labels
                    .into_iter()
                    .map(|(key, value)| (Value::String(key.to_string()), Value::String(value)))
                    .collect::<Mapping>();
                service.insert(Value::String("labels".to_string()), Value::Mapping(entries));
            }
        }
    }

    Ok(serde_yaml::to_string(&doc)?)
}

fn to_service(container: ContainerSummary) -> DeploymentService {
    DeploymentService {
        node_id: container
            .labels
            .get(SERVICE_LABEL)
            .cloned()
            .unwrap_or_else(|| container.name.clone()),
        service_id: container.id,
        name: container.name,
        image: container.image,
        state: container.state,
        status: container.status,
        ports: port_map(&container.ports),
    }
}

/// Deploys a module with `docker compose`
pub struct ComposeDeployer {
    project: String,
    content: String,
    environment: Vec<(String, String)>,
    engine: Arc<dyn ContainerEngine>,
    commands: Arc<dyn CommandRunner>,
    settings: ExecutorSettings,
}

impl ComposeDeployer {
    pub fn new(ctx: &ExecutorContext, deployment: &Deployment) -> Result<Self, AgentError> {
        let content = deployment
            .module
            .content
            .docker_compose
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::ComposeContentUnavailable(deployment.id.clone()))?;

        Ok(Self {
            project: project_name(&deployment.id),
            content,
            environment: deployment.environment(),
            engine: ctx.engines.connect()?,
            commands: ctx.commands.clone(),
            settings: ctx.settings.clone(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn compose(&self, args: &[&str], cwd: Option<&Path>) -> CommandSpec {
        let mut full = vec!["compose", "-p", self.project.as_str()];
        full.extend_from_slice(args);

        let spec = CommandSpec::new(&self.settings.docker_program, full, self.settings.command_timeout)
            .envs(self.environment.clone());
        match cwd {
            Some(dir) => spec.current_dir(dir),
            None => spec,
        }
    }

    async fn deploy(&self, staging: &StagingDir) -> Result<String, AgentError> {
        let config_file = staging.path().join(COMPOSE_FILE);
        let labeled = inject_labels(&self.content, &self.project, staging.path(), &config_file)?;
        staging.write_file(COMPOSE_FILE, &labeled).await?;

        let env_file: String = self
            .environment
            .iter()
            .map(|(name, value)| format!("{}={}\n", name, value))
            .collect();
        staging.write_file(ENV_FILE, &env_file).await?;

        let file = config_file.display().to_string();
        let pull = self.compose(&["-f", file.as_str(), "pull"], Some(staging.path()));
        let pulled = run_checked(self.commands.as_ref(), &pull).await?;

        let up = self.compose(&["-f", file.as_str(), "up", "-d"], Some(staging.path()));
        let started = run_checked(self.commands.as_ref(), &up).await?;

        Ok([pulled.combined(), started.combined()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl Deployer for ComposeDeployer {
    async fn start(&self) -> Result<String, AgentError> {
        info!("Starting compose project {}", self.project);

        let staging = StagingDir::create(&self.settings.staging_root, &self.project).await?;
        let result = self.deploy(&staging).await;
        if let Err(e) = staging.remove().await {
            warn!("Failed to remove staging directory for {}: {}", self.project, e);
        }
        result
    }

    async fn stop(&self) -> Result<String, AgentError> {
        info!("Stopping compose project {}", self.project);

        let down = self.compose(&["down"], None);
        let output = run_checked(self.commands.as_ref(), &down).await?.combined();
        if output.is_empty() {
            return Ok(format!("Project {} removed", self.project));
        }
        Ok(output)
    }

    async fn state(&self) -> Result<Vec<DeploymentService>, AgentError> {
        let containers = self.engine.list_containers(PROJECT_LABEL, &self.project).await?;
        let mut services: Vec<DeploymentService> = containers.into_iter().map(to_service).collect();
        services.sort_by(|a, b| (&a.node_id, &a.service_id).cmp(&(&b.node_id, &b.service_id)));
        Ok(services)
    }

    async fn close(&self) {
        self.engine.close().await;
    }
}
