use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP literal or hostname; the first resolved address is bound.
    pub host: String,
    pub http_port: u16,
    pub ssh_port: u16,
    /// Holds the database, the bare repositories, generated ref archives and
    /// the SSH host key.
    pub data_dir: PathBuf,
    /// Git executable used for every protocol subprocess.
    pub git_bin: PathBuf,
    /// Upper bound on the lifetime of a single git subprocess.
    pub git_timeout_secs: u64,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub async fn http_addr(&self) -> Result<SocketAddr> {
        self.resolve(self.http_port).await
    }

    pub async fn ssh_addr(&self) -> Result<SocketAddr> {
        self.resolve(self.ssh_port).await
    }

    async fn resolve(&self, port: u16) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), port))
            .await
            .map_err(|e| Error::Config(format!("cannot resolve host '{}': {e}", self.host)))?;

        addrs
            .next()
            .ok_or_else(|| Error::Config(format!("host '{}' has no addresses", self.host)))
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("gitgate.db")
    }

    #[must_use]
    pub fn repo_root(&self) -> PathBuf {
        self.data_dir.join("repositories")
    }

    #[must_use]
    pub fn refs_dir(&self) -> PathBuf {
        self.data_dir.join("refs")
    }

    #[must_use]
    pub fn host_key_path(&self) -> PathBuf {
        self.data_dir.join("ssh").join("host_ed25519")
    }

    #[must_use]
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 8080,
            ssh_port: 2222,
            data_dir: PathBuf::from("./data"),
            git_bin: PathBuf::from("git"),
            git_timeout_secs: 300,
        }
    }
}
