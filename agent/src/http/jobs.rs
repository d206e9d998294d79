//! Job API client

use api_models::models::{Collection, Job, JobUpdate, ResourceId};

use crate::errors::AgentError;
use crate::http::client::HttpClient;

/// Fields this agent updates on a job
const JOB_UPDATE_FIELDS: &[&str] = &["state", "progress", "status-message", "return-code"];

impl HttpClient {
    /// Fetch a job resource
    pub async fn get_job(&self, job_id: &str) -> Result<Job, AgentError> {
        self.get(job_id, &[]).await
    }

    /// Apply a partial update to a job
    pub async fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<(), AgentError> {
        let select: Vec<&str> = JOB_UPDATE_FIELDS
            .iter()
            .copied()
            .filter(|field| match *field {
                "state" => update.state.is_some(),
                "progress" => update.progress.is_some(),
                "status-message" => update.status_message.is_some(),
                "return-code" => update.return_code.is_some(),
                _ => false,
            })
            .collect();

        let _: serde_json::Value = self.put(job_id, &select, update).await?;
        Ok(())
    }

    /// Ids of queued jobs meant to be pulled by this agent
    pub async fn get_queued_job_ids(&self, agent_id: &str) -> Result<Vec<String>, AgentError> {
        let mut filter = "state='QUEUED' and execution-mode='pull'".to_string();
        if !agent_id.is_empty() {
            filter.push_str(&format!(" and affected-resources/href='{}'", agent_id));
        }

        let response: Collection<ResourceId> = self
            .get(
                "job",
                &[("filter", filter.as_str()), ("select", "id"), ("orderby", "created:asc")],
            )
            .await?;
        Ok(response.resources.into_iter().map(|r| r.id).collect())
    }
}
