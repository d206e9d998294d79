//! Fleet Agent Library
//!
//! Core modules of the edge job execution agent.

pub mod actions;
pub mod app;
pub mod deploy;
pub mod engine;
pub mod errors;
pub mod host;
pub mod http;
pub mod jobs;
pub mod logs;
pub mod models;
pub mod resources;
pub mod storage;
pub mod utils;
pub mod workers;
