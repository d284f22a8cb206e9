//! SSH/SFTP file retrieval
//!
//! `ssh2` is blocking, so every fetch runs on the blocking thread pool. The
//! dial is bounded by the caller's timeout, which also bounds every read on
//! the established session.

use std::io::Read;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use keel_core::domain::node::NodeAuth;
use ssh2::Session;
use tracing::debug;

use crate::error::{Error, Result};

/// Address and credentials of a remote host
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub auth: NodeAuth,
}

impl SshTarget {
    fn dial_error(&self, message: impl ToString) -> Error {
        Error::Dial {
            host: format!("{}:{}", self.host, self.port),
            message: message.to_string(),
        }
    }
}

/// Reads whole files from remote hosts
#[async_trait]
pub trait RemoteFileFetcher: Send + Sync {
    async fn fetch(&self, target: &SshTarget, path: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// [`RemoteFileFetcher`] over SSH with SFTP
#[derive(Debug, Clone, Default)]
pub struct Ssh2Fetcher;

impl Ssh2Fetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteFileFetcher for Ssh2Fetcher {
    async fn fetch(&self, target: &SshTarget, path: &str, timeout: Duration) -> Result<Vec<u8>> {
        let target = target.clone();
        let path = path.to_string();
        let host = target.host.clone();

        tokio::task::spawn_blocking(move || fetch_blocking(&target, &path, timeout))
            .await
            .map_err(|e| Error::Dial {
                host,
                message: format!("fetch task failed: {}", e),
            })?
    }
}

fn fetch_blocking(target: &SshTarget, path: &str, timeout: Duration) -> Result<Vec<u8>> {
    let ip: IpAddr = target
        .host
        .parse()
        .map_err(|_| target.dial_error("not an IP address"))?;
    let addr = SocketAddr::new(ip, target.port);

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| target.dial_error(e))?;

    let mut session = Session::new().map_err(|e| target.dial_error(e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| target.dial_error(e))?;

    match &target.auth {
        NodeAuth::Password { user, password } => session
            .userauth_password(user, password)
            .map_err(|e| target.dial_error(e))?,
        NodeAuth::Key { data, .. } => session
            .userauth_pubkey_memory(target.auth.user(), None, data, None)
            .map_err(|e| target.dial_error(e))?,
    }

    if !session.authenticated() {
        return Err(target.dial_error("authentication rejected"));
    }
    debug!("SSH session established with {}", target.host);

    let sftp = session.sftp().map_err(|e| target.dial_error(e))?;
    let mut file = sftp
        .open(Path::new(path))
        .map_err(|e| target.dial_error(format!("open {}: {}", path, e)))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| target.dial_error(format!("read {}: {}", path, e)))?;

    debug!("Read {} bytes of {} from {}", contents.len(), path, target.host);
    Ok(contents)
}
