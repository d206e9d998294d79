//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::host::RunMode;
use crate::logs::LogLevel;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/fleetagent/settings.json";

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rotated log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Agent identity on the control plane, e.g. `nuvlabox/<uuid>`
    #[serde(default)]
    pub agent_id: String,

    /// Container engine configuration
    #[serde(default)]
    pub engine: EngineSettings,

    /// Overrides run mode detection
    #[serde(default)]
    pub run_mode: Option<RunMode>,

    /// Capacity of the job intake queue
    #[serde(default = "default_job_queue_capacity")]
    pub job_queue_capacity: usize,

    /// Enable polling worker
    #[serde(default = "default_true")]
    pub enable_poller: bool,

    /// Polling interval in seconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Root of the per-deployment staging directories
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Deadline of engine CLI calls in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Deadline of stack removal in seconds
    #[serde(default = "default_stack_remove_timeout")]
    pub stack_remove_timeout_secs: u64,

    /// Maximum graceful shutdown delay in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_job_queue_capacity() -> usize {
    64
}

fn default_polling_interval() -> u64 {
    10
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/fleetagent")
}

fn default_command_timeout() -> u64 {
    600
}

fn default_stack_remove_timeout() -> u64 {
    30
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            backend: BackendSettings::default(),
            agent_id: String::new(),
            engine: EngineSettings::default(),
            run_mode: None,
            job_queue_capacity: default_job_queue_capacity(),
            enable_poller: true,
            polling_interval_secs: default_polling_interval(),
            staging_dir: default_staging_dir(),
            command_timeout_secs: default_command_timeout(),
            stack_remove_timeout_secs: default_stack_remove_timeout(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, AgentError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, AgentError> {
        let settings: Settings = serde_json::from_str(contents)?;
        if settings.job_queue_capacity == 0 {
            return Err(AgentError::ConfigError(
                "job_queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// API key used to open a session
    #[serde(default)]
    pub api_key: String,

    /// API key secret, only held in memory as a `SecretString` once loaded
    #[serde(default, skip_serializing)]
    pub api_secret: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8200/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            api_key: String::new(),
            api_secret: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine socket path, platform default when unset
    #[serde(default)]
    pub socket_path: Option<String>,
}
