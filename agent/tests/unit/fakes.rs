//! In-memory collaborators for the executor layer

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_models::models::{
    Deployment, DeploymentParameter, DeploymentState, EnvironmentVariable, Job, JobUpdate, Module,
    ModuleContent, OutputParameter, ResourceRef,
};
use async_trait::async_trait;

use fleetagent::deploy::command::{CommandOutput, CommandRunner, CommandSpec};
use fleetagent::deploy::{ExecutorContext, ExecutorSettings};
use fleetagent::engine::{
    ContainerEngine, ContainerSummary, EngineConnector, EngineError, HelperContainer,
    PublishedPort, ServiceSummary,
};
use fleetagent::errors::AgentError;
use fleetagent::host::{HostNetwork, HostProbe, RunMode};
use fleetagent::http::control_plane::ControlPlane;

// ================================ CONTROL PLANE ================================== //

#[derive(Default)]
pub struct FakeControlPlane {
    jobs: Mutex<HashMap<String, Job>>,
    deployments: Mutex<HashMap<String, Deployment>>,
    job_updates: Mutex<Vec<(String, JobUpdate)>>,
    states: Mutex<Vec<(String, DeploymentState)>>,
    parameters: Mutex<Vec<DeploymentParameter>>,
    pending: Mutex<Vec<String>>,
    pub get_job_calls: AtomicUsize,
    pub fail_parameters: bool,
    poll_failures: AtomicUsize,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(self, job: Job) -> Self {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.deployments
            .lock()
            .unwrap()
            .insert(deployment.id.clone(), deployment);
        self
    }

    pub fn failing_parameters(mut self) -> Self {
        self.fail_parameters = true;
        self
    }

    /// The next `count` polls fail before pending jobs are returned
    pub fn failing_polls(self, count: usize) -> Self {
        self.poll_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_pending(self, job_ids: &[&str]) -> Self {
        *self.pending.lock().unwrap() = job_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn job_updates(&self) -> Vec<(String, JobUpdate)> {
        self.job_updates.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<DeploymentState> {
        self.states.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    pub fn parameters(&self) -> Vec<DeploymentParameter> {
        self.parameters.lock().unwrap().clone()
    }

    pub fn parameter(&self, name: &str) -> Option<DeploymentParameter> {
        self.parameters().into_iter().rev().find(|p| p.name == name)
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get_job(&self, job_id: &str) -> Result<Job, AgentError> {
        self.get_job_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(job_id.to_string()))
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), AgentError> {
        self.job_updates
            .lock()
            .unwrap()
            .push((job_id.to_string(), update));
        Ok(())
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, AgentError> {
        self.deployments
            .lock()
            .unwrap()
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(deployment_id.to_string()))
    }

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> Result<(), AgentError> {
        self.states
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), state));
        Ok(())
    }

    async fn update_parameter(&self, parameter: DeploymentParameter) -> Result<(), AgentError> {
        if self.fail_parameters {
            return Err(AgentError::ControlPlaneError("503: unavailable".to_string()));
        }
        self.parameters.lock().unwrap().push(parameter);
        Ok(())
    }

    async fn pending_jobs(&self, _agent_id: &str) -> Result<Vec<String>, AgentError> {
        let failing = self
            .poll_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AgentError::ControlPlaneError("502: bad gateway".to_string()));
        }
        Ok(self.pending.lock().unwrap().clone())
    }
}

// =================================== ENGINE ====================================== //

#[derive(Default)]
pub struct FakeEngine {
    pub containers: Mutex<HashSet<String>>,
    pub listed: Mutex<Vec<ContainerSummary>>,
    pub services: Mutex<Vec<ServiceSummary>>,
    pub helpers: Mutex<Vec<HelperContainer>>,
    pub manager: bool,
    pub closes: AtomicUsize,
}

impl FakeEngine {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull_image(&self, image: &str) -> Result<Option<String>, EngineError> {
        if image.contains("missing") {
            return Err(EngineError::NotFound(format!("manifest for {} not found", image)));
        }
        if image.contains(':') {
            Ok(Some(format!("Status: Downloaded newer image for {}", image)))
        } else {
            Ok(Some(format!("Status: Image is up to date for {}", image)))
        }
    }

    async fn remove_image(&self, image: &str) -> Result<(), EngineError> {
        Err(EngineError::Conflict(format!("image {} is being used", image)))
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        if self.containers.lock().unwrap().remove(id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("No such container: {}", id)))
        }
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidParameter("empty volume name".to_string()));
        }
        Ok(())
    }

    async fn remove_network(&self, _id: &str) -> Result<(), EngineError> {
        Err(EngineError::Other("daemon unreachable".to_string()))
    }

    async fn list_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        Ok(self
            .listed
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.labels.get(label).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn list_stack_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceSummary>, EngineError> {
        let prefix = format!("{}_", namespace);
        Ok(self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn swarm_manager(&self) -> Result<bool, EngineError> {
        Ok(self.manager)
    }

    async fn run_helper(&self, helper: &HelperContainer) -> Result<String, EngineError> {
        self.helpers.lock().unwrap().push(helper.clone());
        Ok("helper-1".to_string())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeConnector {
    pub engine: Arc<FakeEngine>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(engine: FakeEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl EngineConnector for FakeConnector {
    fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.engine.clone())
    }
}

// ================================== COMMANDS ===================================== //

/// Records commands and snapshots the files they are given with `-f`/`-c`
#[derive(Default)]
pub struct FakeCommandRunner {
    commands: Mutex<Vec<CommandSpec>>,
    files: Mutex<Vec<String>>,
    pub fail_on: Option<String>,
    pub timeout_on: Option<String>,
}

impl FakeCommandRunner {
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            fail_on: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    pub fn timing_out_on(pattern: &str) -> Self {
        Self {
            timeout_on: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(CommandSpec::display)
            .collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.commands.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError> {
        self.commands.lock().unwrap().push(spec.clone());
        let line = spec.display();

        if let Some(pos) = spec.args.iter().position(|a| a == "-f" || a == "-c") {
            if let Some(file) = spec.args.get(pos + 1) {
                let contents = std::fs::read_to_string(Path::new(file)).unwrap_or_default();
                self.files.lock().unwrap().push(contents);
            }
        }

        if self.timeout_on.as_deref().is_some_and(|p| line.contains(p)) {
            return Err(AgentError::CommandTimeout(spec.timeout, line));
        }
        if self.fail_on.as_deref().is_some_and(|p| line.contains(p)) {
            return Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("{} failed", line),
            });
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: format!("ran {}\n", spec.args.join(" ")),
            stderr: String::new(),
        })
    }
}

// ==================================== HOST ======================================= //

pub struct FixedHostProbe;

impl HostProbe for FixedHostProbe {
    fn network(&self) -> HostNetwork {
        HostNetwork {
            hostname: Some("edge-1".to_string()),
            interfaces: BTreeMap::from([("eth0".to_string(), "10.0.0.5".to_string())]),
        }
    }
}

// =================================== BUILDERS ==================================== //

pub struct Harness {
    pub control: Arc<FakeControlPlane>,
    pub connector: Arc<FakeConnector>,
    pub runner: Arc<FakeCommandRunner>,
    pub staging: tempfile::TempDir,
}

impl Harness {
    pub fn new(control: FakeControlPlane, engine: FakeEngine, runner: FakeCommandRunner) -> Self {
        Self {
            control: Arc::new(control),
            connector: Arc::new(FakeConnector::new(engine)),
            runner: Arc::new(runner),
            staging: tempfile::tempdir().unwrap(),
        }
    }

    pub fn context(&self, run_mode: RunMode, super_user: bool) -> ExecutorContext {
        ExecutorContext {
            control: self.control.clone(),
            engines: self.connector.clone(),
            commands: self.runner.clone(),
            host: Arc::new(FixedHostProbe),
            run_mode,
            super_user,
            settings: ExecutorSettings {
                staging_root: self.staging.path().to_path_buf(),
                docker_program: "docker".to_string(),
                command_timeout: Duration::from_secs(5),
                stack_remove_timeout: Duration::from_secs(1),
            },
        }
    }

    pub fn engine(&self) -> &FakeEngine {
        &self.connector.engine
    }

    /// Staging directories left behind
    pub fn staged(&self) -> usize {
        std::fs::read_dir(self.staging.path()).map(|d| d.count()).unwrap_or(0)
    }
}

pub fn job(id: &str, action: &str, target: Option<&str>) -> Job {
    Job {
        id: id.to_string(),
        action: action.to_string(),
        state: None,
        progress: None,
        target_resource: target.map(|href| ResourceRef {
            href: href.to_string(),
        }),
        affected_resources: Vec::new(),
        payload: None,
        status_message: None,
        return_code: None,
    }
}

pub const COMPOSE_APP: &str = r#"services:
  web:
    image: nginx:1.25
    ports:
      - "${PORT:-8080}:80"
"#;

pub fn deployment(id: &str, subtype: &str, compatibility: Option<&str>, content: Option<&str>) -> Deployment {
    Deployment {
        id: id.to_string(),
        owner: "user/alice".to_string(),
        state: Some("STOPPED".to_string()),
        module: Module {
            subtype: subtype.to_string(),
            compatibility: compatibility.map(str::to_string),
            content: ModuleContent {
                docker_compose: content.map(str::to_string),
                environmental_variables: vec![EnvironmentVariable {
                    name: "TAG".to_string(),
                    value: Some("1.25".to_string()),
                    description: None,
                }],
                output_parameters: vec![OutputParameter {
                    name: "admin-url".to_string(),
                    description: Some("Admin console".to_string()),
                }],
                files: Vec::new(),
            },
        },
    }
}

pub fn container(id: &str, project: &str, service: &str, port: Option<(u16, u16)>) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        name: format!("{}-{}-1", project, service),
        image: "nginx:1.25".to_string(),
        state: "running".to_string(),
        status: "Up 3 minutes".to_string(),
        labels: BTreeMap::from([
            ("com.docker.compose.project".to_string(), project.to_string()),
            ("com.docker.compose.service".to_string(), service.to_string()),
        ]),
        ports: port
            .map(|(target, published)| {
                vec![PublishedPort {
                    protocol: "tcp".to_string(),
                    target_port: target,
                    published_port: published,
                }]
            })
            .unwrap_or_default(),
    }
}
