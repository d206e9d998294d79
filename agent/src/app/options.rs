//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::ExecutorSettings;
use crate::host::RunMode;
use crate::workers::poller;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Backend API base URL
    pub backend_base_url: String,

    /// Backend request timeout
    pub request_timeout: Duration,

    /// API key pair, no session is opened without it
    pub api_key: Option<(String, SecretString)>,

    /// Engine socket path, platform default when unset
    pub engine_socket: Option<String>,

    /// Forced run mode, probed when unset
    pub run_mode: Option<RunMode>,

    /// Capacity of the job intake queue
    pub job_queue_capacity: usize,

    /// Enable polling worker
    pub enable_poller: bool,

    /// Poller worker options
    pub poller: poller::Options,

    /// Executor tunables
    pub executor: ExecutorSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            backend_base_url: "http://localhost:8200/api".to_string(),
            request_timeout: Duration::from_secs(30),
            api_key: None,
            engine_socket: None,
            run_mode: None,
            job_queue_capacity: 64,
            enable_poller: true,
            poller: poller::Options::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Split an optional key and secret into a key pair
pub fn api_key_pair(key: &str, secret: Option<String>) -> Option<(String, SecretString)> {
    match (key.is_empty(), secret) {
        (false, Some(secret)) => Some((key.to_string(), SecretString::from(secret))),
        _ => None,
    }
}
