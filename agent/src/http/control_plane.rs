//! Control-plane contract used by the executor layer

use async_trait::async_trait;

use api_models::models::{Deployment, DeploymentParameter, DeploymentState, Job, JobUpdate};

use crate::errors::AgentError;
use crate::http::client::HttpClient;

/// Authoritative remote storage for jobs and deployments.
///
/// Nothing read through this trait is cached across job invocations.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Job, AgentError>;

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), AgentError>;

    async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, AgentError>;

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> Result<(), AgentError>;

    async fn update_parameter(&self, parameter: DeploymentParameter) -> Result<(), AgentError>;

    /// Ids of queued jobs waiting for this agent
    async fn pending_jobs(&self, agent_id: &str) -> Result<Vec<String>, AgentError>;
}

#[async_trait]
impl ControlPlane for HttpClient {
    async fn get_job(&self, job_id: &str) -> Result<Job, AgentError> {
        HttpClient::get_job(self, job_id).await
    }

    async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<(), AgentError> {
        HttpClient::update_job(self, job_id, &update).await
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, AgentError> {
        HttpClient::get_deployment(self, deployment_id).await
    }

    async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> Result<(), AgentError> {
        HttpClient::set_deployment_state(self, deployment_id, state).await
    }

    async fn update_parameter(&self, parameter: DeploymentParameter) -> Result<(), AgentError> {
        self.update_deployment_parameter(&parameter).await
    }

    async fn pending_jobs(&self, agent_id: &str) -> Result<Vec<String>, AgentError> {
        self.get_queued_job_ids(agent_id).await
    }
}
