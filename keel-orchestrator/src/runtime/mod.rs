//! Container runtime layer
//!
//! The bootstrap and deploy handlers drive the installer through this
//! interface. A handler connects once per invocation and drops the client
//! when it returns, so no client outlives the step that acquired it.

pub mod podman;

pub use podman::PodmanRuntime;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Everything needed to create a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<(String, String)>,
    /// (host path, container path) bind mounts
    pub mounts: Vec<(PathBuf, String)>,
}

/// A container as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }
}

/// Factory for runtime clients
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ContainerClient>>;
}

/// A connected runtime client
#[async_trait]
pub trait ContainerClient: Send + Sync {
    /// Lists containers; `all` includes stopped ones
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Creates a container and returns its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    /// Blocks until the container exits and returns its exit code
    async fn wait(&self, id: &str) -> Result<i64>;

    async fn stop(&self, id: &str, grace: Duration) -> Result<()>;

    /// Force-removes a container
    async fn remove(&self, id: &str) -> Result<()>;
}
