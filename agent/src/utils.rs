//! Build metadata and retry delays

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Build metadata embedded by the build script
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_time: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIME").unwrap_or("unknown"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fleetagent {} ({}, built {})", self.version, self.git_hash, self.build_time)
    }
}

/// Geometric retry delay, `base * factor^attempt` capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
            factor: 2,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt`, counting from zero
    pub fn delay(&self, attempt: u32) -> Duration {
        self.factor
            .checked_pow(attempt)
            .and_then(|scale| self.base.checked_mul(scale))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
