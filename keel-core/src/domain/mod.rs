//! Core domain types
//!
//! These types represent the entities the orchestrator persists and the
//! structured specs decoded from them. They are shared between the store
//! (persistence) and the pipeline handlers (execution).

pub mod cluster;
pub mod config;
pub mod node;
pub mod plan;
pub mod task;
