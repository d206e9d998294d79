//! Job intake and lifecycle

pub mod manager;
