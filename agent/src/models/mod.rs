//! Data models

pub mod resource;
pub mod service;
