//! Bollard-backed container engine

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, ListContainersOptions, ListServicesOptions,
    ListTasksOptions, RemoveContainerOptions, RemoveImageOptions, RemoveVolumeOptions,
    StartContainerOptions,
};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::engine::{
    ContainerEngine, ContainerSummary, EngineConnector, EngineError, HelperContainer,
    PublishedPort, ServiceSummary,
};

/// Timeout applied to every engine API request, in seconds
const CLIENT_TIMEOUT_SECS: u64 = 120;

fn map_engine_error(e: bollard::errors::Error) -> EngineError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => match *status_code {
            400 => EngineError::InvalidParameter(message.clone()),
            404 => EngineError::NotFound(message.clone()),
            409 => EngineError::Conflict(message.clone()),
            _ => EngineError::Other(e.to_string()),
        },
        _ => EngineError::Other(e.to_string()),
    }
}

fn label_filter(label: &str, value: &str) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec![format!("{}={}", label, value)]);
    filters
}

fn lowercase_debug<T: std::fmt::Debug>(value: Option<T>) -> String {
    value
        .map(|v| format!("{:?}", v).to_lowercase())
        .unwrap_or_default()
}

/// Connects to the local engine socket
#[derive(Debug, Clone, Default)]
pub struct DockerConnector {
    socket_path: Option<String>,
}

impl DockerConnector {
    pub fn new(socket_path: Option<String>) -> Self {
        Self { socket_path }
    }
}

impl EngineConnector for DockerConnector {
    fn connect(&self) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        let client = match &self.socket_path {
            Some(path) => {
                Docker::connect_with_unix(path, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| EngineError::Other(format!("failed to connect to engine: {}", e)))?;

        debug!("Opened container engine client");
        Ok(Arc::new(DockerEngine::new(client)))
    }
}

/// Container engine backed by the Docker API
pub struct DockerEngine {
    client: RwLock<Option<Docker>>,
}

impl DockerEngine {
    pub fn new(client: Docker) -> Self {
        Self {
            client: RwLock::new(Some(client)),
        }
    }

    fn client(&self) -> Result<Docker, EngineError> {
        let client = self.client.read().unwrap_or_else(|e| e.into_inner());
        client.clone().ok_or(EngineError::Closed)
    }

    async fn consume_pull(&self, client: &Docker, image: &str) -> Result<Option<String>, EngineError> {
        let opts = CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        };

        let mut last_status = None;
        let mut stream = client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            let info = result.map_err(map_engine_error)?;
            if let Some(status) = info.status {
                last_status = Some(status);
            }
        }

        Ok(last_status)
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull_image(&self, image: &str) -> Result<Option<String>, EngineError> {
        let client = self.client()?;
        debug!("Pulling image {}", image);
        self.consume_pull(&client, image).await
    }

    async fn remove_image(&self, image: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        client
            .remove_image(image, Some(RemoveImageOptions::default()), None)
            .await
            .map_err(map_engine_error)?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        client
            .remove_container(id, Some(RemoveContainerOptions::default()))
            .await
            .map_err(map_engine_error)
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        client
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(map_engine_error)
    }

    async fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        let client = self.client()?;
        client.remove_network(id).await.map_err(map_engine_error)
    }

    async fn list_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let client = self.client()?;
        let opts = ListContainersOptions {
            all: true,
            filters: Some(label_filter(label, value)),
            ..Default::default()
        };

        let containers = client
            .list_containers(Some(opts))
            .await
            .map_err(map_engine_error)?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                let ports = c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|p| {
                        p.public_port.map(|public| PublishedPort {
                            protocol: lowercase_debug(p.typ),
                            target_port: p.private_port,
                            published_port: public,
                        })
                    })
                    .collect();

                ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    name,
                    image: c.image.unwrap_or_default(),
                    state: lowercase_debug(c.state),
                    status: c.status.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default().into_iter().collect::<BTreeMap<_, _>>(),
                    ports,
                }
            })
            .collect())
    }

    async fn list_stack_services(
        &self,
        namespace: &str,
    ) -> Result<Vec<ServiceSummary>, EngineError> {
        let client = self.client()?;
        let opts = ListServicesOptions {
            filters: Some(label_filter("com.docker.stack.namespace", namespace)),
            ..Default::default()
        };

        let services = client
            .list_services(Some(opts))
            .await
            .map_err(map_engine_error)?;

        let mut summaries = Vec::with_capacity(services.len());
        for service in services {
            let id = service.id.unwrap_or_default();
            let spec = service.spec.unwrap_or_default();

            let mut task_filters = HashMap::new();
            task_filters.insert("service".to_string(), vec![id.clone()]);
            let tasks = client
                .list_tasks(Some(ListTasksOptions {
                    filters: Some(task_filters),
                    ..Default::default()
                }))
                .await
                .map_err(map_engine_error)?;

            let latest = tasks
                .into_iter()
                .max_by(|a, b| a.updated_at.cmp(&b.updated_at))
                .and_then(|t| t.status);

            let ports = service
                .endpoint
                .and_then(|e| e.ports)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| match (p.target_port, p.published_port) {
                    (Some(target), Some(published)) => Some(PublishedPort {
                        protocol: lowercase_debug(p.protocol),
                        target_port: u16::try_from(target).ok()?,
                        published_port: u16::try_from(published).ok()?,
                    }),
                    _ => None,
                })
                .collect();

            let image = spec
                .task_template
                .and_then(|t| t.container_spec)
                .and_then(|c| c.image)
                .unwrap_or_default();

            let (state, status) = match latest {
                Some(status) => (
                    lowercase_debug(status.state),
                    status.message.unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            };

            summaries.push(ServiceSummary {
                id,
                name: spec.name.unwrap_or_default(),
                image,
                state,
                status,
                ports,
            });
        }

        Ok(summaries)
    }

    async fn swarm_manager(&self) -> Result<bool, EngineError> {
        let client = self.client()?;
        match client.inspect_swarm().await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 503 | 406,
                ..
            }) => Ok(false),
            Err(e) => Err(map_engine_error(e)),
        }
    }

    async fn run_helper(&self, helper: &HelperContainer) -> Result<String, EngineError> {
        let client = self.client()?;
        self.consume_pull(&client, &helper.image).await?;

        let body = ContainerCreateBody {
            image: Some(helper.image.clone()),
            cmd: Some(helper.command.clone()),
            host_config: Some(HostConfig {
                privileged: Some(true),
                pid_mode: Some("host".to_string()),
                binds: Some(helper.binds.clone()),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(helper.name.clone()),
            ..Default::default()
        };

        let response = client
            .create_container(Some(opts), body)
            .await
            .map_err(map_engine_error)?;

        client
            .start_container(&response.id, None::<StartContainerOptions>)
            .await
            .map_err(map_engine_error)?;

        info!("Started helper container {} ({})", helper.name, response.id);
        Ok(response.id)
    }

    async fn close(&self) {
        let mut client = self.client.write().unwrap_or_else(|e| e.into_inner());
        if client.take().is_some() {
            debug!("Closed container engine client");
        }
    }
}
