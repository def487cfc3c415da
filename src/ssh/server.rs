use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use russh::MethodSet;
use russh::server::{self, Server};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::session::SshSession;
use crate::server::AppState;

pub struct SshServer {
    state: Arc<AppState>,
}

impl SshServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl server::Server for SshServer {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        debug!(peer = ?peer_addr, "New SSH connection");
        SshSession::new(Arc::clone(&self.state), peer_addr)
    }
}

/// Loads the PKCS#8 PEM host key at `path`, generating and persisting an
/// Ed25519 key on first start so the host identity survives restarts.
pub fn load_or_generate_host_key(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        let pem = fs::read_to_string(path)
            .with_context(|| format!("failed to read SSH host key {}", path.display()))?;
        let key = russh_keys::decode_secret_key(&pem, None)
            .with_context(|| format!("failed to decode SSH host key {}", path.display()))?;
        info!(path = %path.display(), "Loaded SSH host key");
        return Ok(key);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let key = KeyPair::generate_ed25519();
    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(&key, &mut pem).context("failed to encode SSH host key")?;
    fs::write(path, &pem)
        .with_context(|| format!("failed to write SSH host key {}", path.display()))?;
    set_restrictive_permissions(path);

    info!(path = %path.display(), "Generated new SSH host key");
    Ok(key)
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &Path) {}

/// Public-key-only server settings around `host_key`.
pub fn ssh_config(host_key: KeyPair) -> Arc<server::Config> {
    Arc::new(server::Config {
        keys: vec![host_key],
        methods: MethodSet::PUBLICKEY,
        inactivity_timeout: Some(Duration::from_secs(600)),
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        max_auth_attempts: 6,
        ..Default::default()
    })
}

/// Accepts SSH connections on a bound listener until it fails.
pub async fn serve_ssh(
    state: Arc<AppState>,
    listener: &TcpListener,
    config: Arc<server::Config>,
) -> Result<()> {
    let mut ssh_server = SshServer::new(state);
    ssh_server
        .run_on_socket(config, listener)
        .await
        .context("SSH server exited with error")?;

    Ok(())
}

/// Runs the SSH listener until it fails.
pub async fn start_ssh_server(
    state: Arc<AppState>,
    addr: SocketAddr,
    host_key_path: &Path,
) -> Result<()> {
    let config = ssh_config(load_or_generate_host_key(host_key_path)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind SSH listener on {addr}"))?;
    info!("SSH listening on {addr}");

    serve_ssh(state, &listener, config).await
}
