//! Long-running background workers

pub mod jobs;
pub mod poller;
