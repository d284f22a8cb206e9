//! Podman container management
//!
//! Drives the container CLI (`podman`, or any docker-compatible binary)
//! through `tokio::process`:
//! - Checking the CLI is available
//! - Listing containers by name
//! - Creating, starting, waiting on, stopping and removing containers

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ContainerClient, ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::error::{Error, Result};

/// Container runtime backed by a CLI binary
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    cli: String,
}

impl PodmanRuntime {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }

    /// Checks the CLI is installed and working
    pub async fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.cli)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                Error::Execution(format!(
                    "failed to execute '{} --version', is it installed? {}",
                    self.cli, e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::Execution(format!(
                "{} is not working correctly",
                self.cli
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!("Container CLI is available: {}", version.trim());
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn connect(&self) -> Result<Box<dyn ContainerClient>> {
        debug!("Acquired {} client", self.cli);
        Ok(Box::new(PodmanClient {
            cli: self.cli.clone(),
        }))
    }
}

/// Client handle for one handler invocation
pub struct PodmanClient {
    cli: String,
}

impl PodmanClient {
    /// Runs the CLI and returns its trimmed stdout
    async fn exec(&self, args: &[String]) -> Result<String> {
        let mut command = Command::new(&self.cli);
        command.args(args).kill_on_drop(true);

        let output = command.output().await.map_err(|e| {
            Error::Execution(format!("failed to execute {} {}: {}", self.cli, args[0], e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stderr.is_empty() {
            debug!("{} {} stderr: {}", self.cli, args[0], stderr);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(Error::Execution(format!(
                "{} {} failed: exit_code={}, stderr='{}'",
                self.cli, args[0], exit_code, stderr
            )));
        }

        Ok(stdout)
    }
}

#[async_trait]
impl ContainerClient for PodmanClient {
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut args = vec!["ps".to_string()];
        if all {
            args.push("--all".to_string());
        }
        args.push("--format".to_string());
        args.push("{{.ID}}\t{{.Names}}".to_string());

        let stdout = self.exec(&args).await?;
        Ok(parse_ps(&stdout))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let args = create_args(spec);
        let id = self.exec(&args).await?;
        info!("Created container {} ({})", spec.name, id);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.exec(&["start".to_string(), id.to_string()]).await?;
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let stdout = self.exec(&["wait".to_string(), id.to_string()]).await?;
        // podman prints one exit code per line when waiting on several ids
        let code = stdout.lines().last().unwrap_or_default().trim();
        code.parse::<i64>().map_err(|_| {
            Error::Execution(format!("unexpected wait output for {}: '{}'", id, stdout))
        })
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<()> {
        self.exec(&[
            "stop".to_string(),
            "--time".to_string(),
            grace.as_secs().to_string(),
            id.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.exec(&["rm".to_string(), "--force".to_string(), id.to_string()])
            .await?;
        Ok(())
    }
}

impl Drop for PodmanClient {
    fn drop(&mut self) {
        debug!("Released {} client", self.cli);
    }
}

fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    for (key, value) in &spec.env {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }

    for (host, container) in &spec.mounts {
        args.push("--volume".to_string());
        args.push(format!("{}:{}", host.display(), container));
    }

    args.push(spec.image.clone());
    args
}

/// Parses `ps` output in `ID<TAB>NAMES` format
fn parse_ps(stdout: &str) -> Vec<ContainerSummary> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let (id, names) = line.split_once('\t')?;
            Some(ContainerSummary {
                id: id.trim().to_string(),
                names: names
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect(),
            })
        })
        .collect()
}
