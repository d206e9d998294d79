//! Normalized view of running deployment services

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::PublishedPort;

/// Backend-agnostic projection of a service or container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentService {
    /// Service name within the deployment
    pub node_id: String,

    /// Engine id of the container or swarm service
    pub service_id: String,

    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,

    /// Published ports keyed `<protocol>.<target port>`
    pub ports: BTreeMap<String, String>,
}

impl DeploymentService {
    /// Output parameters for this service as `(name, value)` pairs
    pub fn parameters(&self) -> Vec<(String, String)> {
        let node = &self.node_id;
        let mut params = vec![
            (format!("{}.node-id", node), self.node_id.clone()),
            (format!("{}.service-id", node), self.service_id.clone()),
            (format!("{}.image", node), self.image.clone()),
            (format!("{}.state", node), self.state.clone()),
            (format!("{}.status", node), self.status.clone()),
        ];
        params.extend(
            self.ports
                .iter()
                .map(|(key, published)| (format!("{}.{}", node, key), published.clone())),
        );
        params
    }
}

/// Published ports keyed `<protocol>.<target port>`, unpublished ports are left out
pub fn port_map(ports: &[PublishedPort]) -> BTreeMap<String, String> {
    ports
        .iter()
        .filter(|p| p.published_port != 0)
        .map(|p| {
            (
                format!("{}.{}", p.protocol, p.target_port),
                p.published_port.to_string(),
            )
        })
        .collect()
}
