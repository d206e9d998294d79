//! API models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to another control-plane resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub href: String,
}

/// Remote job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Failed,
}

/// Job resource issued by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub target_resource: Option<ResourceRef>,
    #[serde(default)]
    pub affected_resources: Vec<ResourceRef>,
    /// Either a JSON document or a string holding one
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub return_code: Option<i32>,
}

impl Job {
    /// Href of the resource this job acts upon
    pub fn target_href(&self) -> Option<&str> {
        self.target_resource.as_ref().map(|r| r.href.as_str())
    }

    /// Decoded payload, unwrapping string-encoded JSON
    pub fn payload_json(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        match &self.payload {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => Ok(None),
            Some(serde_json::Value::String(raw)) => serde_json::from_str(raw).map(Some),
            Some(value) => Ok(Some(value.clone())),
        }
    }
}

/// Partial job update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<JobState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

impl JobUpdate {
    pub fn running(progress: u8) -> Self {
        Self {
            state: Some(JobState::Running),
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Success),
            progress: Some(100),
            status_message: Some(message.into()),
            return_code: Some(0),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failed),
            progress: None,
            status_message: Some(message.into()),
            return_code: Some(1),
        }
    }
}

/// Deployment state as stored on the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Starting,
    Started,
    Stopping,
    Stopped,
    Error,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Starting => "STARTING",
            DeploymentState::Started => "STARTED",
            DeploymentState::Stopping => "STOPPING",
            DeploymentState::Stopped => "STOPPED",
            DeploymentState::Error => "ERROR",
        }
    }

    /// Parse a remote state string; states this agent never sets yield `None`
    pub fn from_remote(value: &str) -> Option<Self> {
        match value {
            "STARTING" => Some(DeploymentState::Starting),
            "STARTED" => Some(DeploymentState::Started),
            "STOPPING" => Some(DeploymentState::Stopping),
            "STOPPED" => Some(DeploymentState::Stopped),
            "ERROR" => Some(DeploymentState::Error),
            _ => None,
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub owner: String,
    /// Raw remote state, may hold values outside [`DeploymentState`]
    #[serde(default)]
    pub state: Option<String>,
    pub module: Module,
}

impl Deployment {
    /// Environment map declared by the module, variables without a value are left out
    pub fn environment(&self) -> Vec<(String, String)> {
        self.module
            .content
            .environmental_variables
            .iter()
            .filter_map(|v| v.value.as_ref().map(|value| (v.name.clone(), value.clone())))
            .collect()
    }
}

/// Module subtype
pub const SUBTYPE_APPLICATION: &str = "application";
pub const SUBTYPE_APPLICATION_KUBERNETES: &str = "application_kubernetes";

/// Module compatibility
pub const COMPATIBILITY_DOCKER_COMPOSE: &str = "docker-compose";
pub const COMPATIBILITY_SWARM: &str = "swarm";

/// Module (deployment template) description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Module {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub compatibility: Option<String>,
    #[serde(default)]
    pub content: ModuleContent,
}

/// Module content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleContent {
    #[serde(default)]
    pub docker_compose: Option<String>,
    #[serde(default)]
    pub environmental_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub output_parameters: Vec<OutputParameter>,
    #[serde(default)]
    pub files: Vec<ModuleFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Auxiliary file shipped with a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleFile {
    pub file_name: String,
    pub file_content: String,
}

/// Deployment output parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploymentParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub owner: String,
    pub parent: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// Collection query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Bare resource identity, used with `select=id` queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceId {
    pub id: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: String,
}
