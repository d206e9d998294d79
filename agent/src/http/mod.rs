//! Control-plane HTTP client

pub mod client;
pub mod control_plane;
pub mod deployments;
pub mod jobs;
