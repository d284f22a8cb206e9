//! Service Module
//!
//! Write and query surface for plans, consumed by whatever fronts the
//! orchestrator. Services validate input, talk to the store and schedule runs.

pub mod plan;

pub use plan as plan_service;
