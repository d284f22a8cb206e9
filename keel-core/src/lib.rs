//! Keel Core
//!
//! Core types and abstractions for the Keel cluster-provisioning orchestrator.
//!
//! This crate contains:
//! - Domain types: Plan, Node, Config, Task and Cluster records
//! - Codec: round-tripping of the structured specs stored as opaque text
//! - DTOs: validated-at-the-edge requests that create plans, nodes and configs

pub mod codec;
pub mod domain;
pub mod dto;

pub use codec::{Codec, CodecError};
