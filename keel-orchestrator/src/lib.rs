//! Keel Orchestrator
//!
//! Turns a plan (bare-metal nodes plus kubernetes, network and runtime
//! settings) into a running cluster by driving a fixed pipeline of steps:
//!
//! - Repository: Postgres and in-memory persistence with optimistic updates
//! - Service: validated writes, queries and scheduling of plans
//! - Template: rendering of the installer's hosts, inventory and globals
//! - Runtime: installer container lifecycle through the container CLI
//! - SSH: kubeconfig retrieval from master nodes
//! - Pipeline: the handlers and their durable task rows
//! - Scheduler: work queue, per-plan leases and the worker pool

pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod repository;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod ssh;
pub mod template;

pub use error::{Error, Result};
