//! Host facts: run mode, privileges and network identity

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sysinfo::{Networks, System};

/// Where the agent process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Directly on the host
    Host,

    /// Inside a container managed by the local engine
    Container,

    /// Inside an orchestrated pod
    Pod,
}

impl RunMode {
    /// Probe the environment once, at startup
    pub fn detect() -> Self {
        Self::from_markers(
            std::env::var_os("KUBERNETES_SERVICE_HOST").is_some(),
            Path::new("/.dockerenv").exists() || std::env::var_os("container").is_some(),
        )
    }

    /// Pod markers take precedence over container markers
    fn from_markers(pod: bool, container: bool) -> Self {
        if pod {
            RunMode::Pod
        } else if container {
            RunMode::Container
        } else {
            RunMode::Host
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Host => "host",
            RunMode::Container => "container",
            RunMode::Pod => "pod",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(RunMode::Host),
            "container" | "docker" => Ok(RunMode::Container),
            "pod" | "kubernetes" => Ok(RunMode::Pod),
            _ => Err(format!("Invalid run mode: {}", s)),
        }
    }
}

/// Parse the effective uid out of `/proc/<pid>/status` contents
fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

/// Whether the agent runs with super-user identity
pub fn is_super_user() -> bool {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| effective_uid(&status))
        == Some(0)
}

/// Hostname and per-interface addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostNetwork {
    pub hostname: Option<String>,

    /// Interface name to IPv4 address
    pub interfaces: BTreeMap<String, String>,
}

/// Source of host network facts
pub trait HostProbe: Send + Sync {
    fn network(&self) -> HostNetwork;
}

/// Reads host facts through sysinfo
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn network(&self) -> HostNetwork {
        let networks = Networks::new_with_refreshed_list();

        let interfaces = networks
            .list()
            .iter()
            .filter_map(|(name, data)| {
                data.ip_networks()
                    .iter()
                    .find_map(|net| match net.addr {
                        IpAddr::V4(addr) if !addr.is_loopback() => Some(addr.to_string()),
                        _ => None,
                    })
                    .map(|addr| (name.clone(), addr))
            })
            .collect();

        HostNetwork {
            hostname: System::host_name(),
            interfaces,
        }
    }
}
