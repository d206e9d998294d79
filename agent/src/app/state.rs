//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::command::ProcessRunner;
use crate::deploy::ExecutorContext;
use crate::engine::docker::DockerConnector;
use crate::errors::AgentError;
use crate::host::{is_super_user, RunMode, SystemProbe};
use crate::http::client::HttpClient;
use crate::jobs::manager::JobManager;

/// Main application state
pub struct AppState {
    /// HTTP client for control-plane communication
    pub http_client: Arc<HttpClient>,

    /// Shared executor collaborators
    pub context: Arc<ExecutorContext>,

    /// Job lifecycle manager
    pub job_manager: Arc<JobManager>,
}

impl AppState {
    /// Initialize application state, opening a control-plane session when a key is configured
    pub async fn init(options: &AppOptions) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let http_client = Arc::new(HttpClient::new(
            &options.backend_base_url,
            options.request_timeout,
        )?);
        match &options.api_key {
            Some((key, secret)) => http_client.login(key, secret).await?,
            None => warn!("No API key configured, using the control plane without a session"),
        }

        let run_mode = options.run_mode.unwrap_or_else(RunMode::detect);
        let super_user = is_super_user();
        info!("Run mode: {}, super-user: {}", run_mode, super_user);

        let context = Arc::new(ExecutorContext {
            control: http_client.clone(),
            engines: Arc::new(DockerConnector::new(options.engine_socket.clone())),
            commands: Arc::new(ProcessRunner),
            host: Arc::new(SystemProbe),
            run_mode,
            super_user,
            settings: options.executor.clone(),
        });
        let job_manager = Arc::new(JobManager::new(context.clone()));

        Ok(Self {
            http_client,
            context,
            job_manager,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        info!("Shutting down application state...");
        let running = self.job_manager.in_flight_count();
        if running > 0 {
            info!("Waiting for {} running job(s) to finish...", running);
            self.job_manager.wait_idle().await;
        }
        self.http_client.logout().await
    }
}
