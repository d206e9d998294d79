//! Deployment API client

use api_models::models::{Collection, Deployment, DeploymentParameter, DeploymentState};

use crate::errors::AgentError;
use crate::http::client::HttpClient;

/// Collection holding deployment output parameters
const PARAMETER_COLLECTION: &str = "deployment-parameter";

impl HttpClient {
    /// Fetch a deployment resource
    pub async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, AgentError> {
        self.get(deployment_id, &[]).await
    }

    /// Update deployment state
    pub async fn set_deployment_state(
        &self,
        deployment_id: &str,
        state: DeploymentState,
    ) -> Result<(), AgentError> {
        let body = serde_json::json!({ "state": state });
        let _: serde_json::Value = self.put(deployment_id, &["state"], &body).await?;
        Ok(())
    }

    /// Create or update an output parameter, matched on parent, name and node
    pub async fn update_deployment_parameter(
        &self,
        parameter: &DeploymentParameter,
    ) -> Result<(), AgentError> {
        let mut filter = format!(
            "parent='{}' and name='{}'",
            parameter.parent, parameter.name
        );
        if let Some(node_id) = &parameter.node_id {
            filter.push_str(&format!(" and node-id='{}'", node_id));
        }

        let existing: Collection<DeploymentParameter> = self
            .get(PARAMETER_COLLECTION, &[("filter", filter.as_str()), ("last", "1")])
            .await?;

        match existing.resources.into_iter().find_map(|p| p.id) {
            Some(id) => {
                let mut select = Vec::new();
                if parameter.value.is_some() {
                    select.push("value");
                }
                if parameter.description.is_some() {
                    select.push("description");
                }
                if select.is_empty() {
                    return Ok(());
                }
                let _: serde_json::Value = self.put(&id, &select, parameter).await?;
            }
            None => {
                let _: serde_json::Value = self.post(PARAMETER_COLLECTION, parameter).await?;
            }
        }
        Ok(())
    }
}
