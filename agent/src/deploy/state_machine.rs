//! Remote deployment state sequencing around a deployer

use std::sync::Arc;

use api_models::models::{Deployment, DeploymentParameter, DeploymentState};
use tracing::{debug, info, warn};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::Deployer;
use crate::errors::AgentError;
use crate::host::HostProbe;
use crate::http::control_plane::ControlPlane;
use crate::models::service::DeploymentService;

/// Drives one deployer and keeps the remote deployment state in step.
///
/// STARTING/STOPPING are published before the deployer runs and
/// STARTED/STOPPED/ERROR after it returns.
pub struct DeploymentStateMachine {
    control: Arc<dyn ControlPlane>,
    host: Arc<dyn HostProbe>,
    deployment: Deployment,
    deployer: Box<dyn Deployer>,
    fsm: DeploymentFsm,
}

impl DeploymentStateMachine {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        host: Arc<dyn HostProbe>,
        deployment: Deployment,
        deployer: Box<dyn Deployer>,
    ) -> Self {
        let initial = deployment.state.as_deref().and_then(DeploymentState::from_remote);
        Self {
            control,
            host,
            deployment,
            deployer,
            fsm: DeploymentFsm::new(initial),
        }
    }

    /// Locally tracked state
    pub fn state(&self) -> Option<DeploymentState> {
        self.fsm.state()
    }

    pub async fn start(&mut self) -> Result<String, AgentError> {
        self.begin(DeploymentEvent::Start).await?;

        let result = self.deployer.start().await;
        if result.is_ok() {
            self.enrich().await;
        }
        self.finish(result).await
    }

    /// Updates go through the start path, the backend converges in place
    pub async fn update(&mut self) -> Result<String, AgentError> {
        self.start().await
    }

    pub async fn stop(&mut self) -> Result<String, AgentError> {
        self.begin(DeploymentEvent::Stop).await?;

        let result = self.deployer.stop().await;
        self.finish(result).await
    }

    /// Republish per-service parameters, returning the service projection as JSON
    pub async fn services(&self) -> Result<String, AgentError> {
        let services = self.deployer.state().await?;
        for service in &services {
            self.publish_service(service).await;
        }
        Ok(serde_json::to_string(&services)?)
    }

    /// Release the deployer
    pub async fn close(self) {
        self.deployer.close().await;
    }

    async fn begin(&mut self, event: DeploymentEvent) -> Result<(), AgentError> {
        let state = self.fsm.process(event).map_err(AgentError::DeployError)?;
        self.control
            .set_deployment_state(&self.deployment.id, state)
            .await
    }

    async fn finish(&mut self, result: Result<String, AgentError>) -> Result<String, AgentError> {
        match result {
            Ok(output) => {
                let state = self
                    .fsm
                    .process(DeploymentEvent::Succeeded)
                    .map_err(AgentError::DeployError)?;
                self.control
                    .set_deployment_state(&self.deployment.id, state)
                    .await?;
                info!("Deployment {} is {}", self.deployment.id, state);
                Ok(output)
            }
            Err(e) => {
                match self.fsm.process(DeploymentEvent::Failed(e.to_string())) {
                    Ok(state) => {
                        if let Err(set_err) = self
                            .control
                            .set_deployment_state(&self.deployment.id, state)
                            .await
                        {
                            warn!(
                                "Failed to set deployment {} to {}: {}",
                                self.deployment.id, state, set_err
                            );
                        }
                    }
                    Err(fsm_err) => warn!("{}", fsm_err),
                }
                Err(e)
            }
        }
    }

    fn parameter(&self, name: String, value: Option<String>) -> DeploymentParameter {
        DeploymentParameter {
            id: None,
            owner: self.deployment.owner.clone(),
            parent: self.deployment.id.clone(),
            name,
            value,
            description: None,
            node_id: None,
        }
    }

    async fn publish(&self, parameter: DeploymentParameter) {
        let name = parameter.name.clone();
        if let Err(e) = self.control.update_parameter(parameter).await {
            warn!(
                "Failed to publish parameter {} of {}: {}",
                name, self.deployment.id, e
            );
        }
    }

    /// Best-effort publication of host identity and declared output parameters
    async fn enrich(&self) {
        let network = self.host.network();

        if let Some(hostname) = network.hostname {
            self.publish(self.parameter("hostname".to_string(), Some(hostname)))
                .await;
        }
        for (iface, addr) in network.interfaces {
            self.publish(self.parameter(format!("ip.{}", iface), Some(addr)))
                .await;
        }

        for output in &self.deployment.module.content.output_parameters {
            let mut parameter = self.parameter(output.name.clone(), None);
            parameter.description = output.description.clone();
            self.publish(parameter).await;
        }
        debug!("Published output parameters of {}", self.deployment.id);
    }

    async fn publish_service(&self, service: &DeploymentService) {
        for (name, value) in service.parameters() {
            let mut parameter = self.parameter(name, Some(value));
            parameter.node_id = Some(service.node_id.clone());
            self.publish(parameter).await;
        }
    }
}
