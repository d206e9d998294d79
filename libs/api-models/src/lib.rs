//! Control-plane resource models
//!
//! Wire types for the fleet control plane as seen by the edge agent.

pub mod models;
