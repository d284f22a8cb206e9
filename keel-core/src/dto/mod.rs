//! Data Transfer Objects
//!
//! Requests accepted by the orchestrator's service layer. Specs travel in
//! structured form here and are encoded with [`crate::codec`] before they
//! reach the store.

pub mod config;
pub mod node;
pub mod plan;
