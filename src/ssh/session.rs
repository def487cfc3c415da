//! Per-connection SSH handler.
//!
//! Each connection gets its own [`SshSession`] holding the authenticated
//! account, the client's `GIT_PROTOCOL` and the sender half of the stdin pipe
//! for the running git process. The git process itself runs on a spawned
//! task that talks back to the channel through a [`Handle`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatch::{self, SessionOutput};
use crate::auth::{find_key_owner, fingerprint};
use crate::server::AppState;

/// Client chunks buffered ahead of git's stdin. A full queue stalls the
/// connection until git catches up.
const INPUT_QUEUE_DEPTH: usize = 64;

pub struct SshSession {
    state: Arc<AppState>,
    id: Uuid,
    peer: Option<SocketAddr>,
    account_id: Option<i64>,
    git_protocol: Option<String>,
    /// Client bytes for the running git process; dropping it is EOF.
    input: Option<mpsc::Sender<Bytes>>,
}

impl SshSession {
    pub fn new(state: Arc<AppState>, peer: Option<SocketAddr>) -> Self {
        Self {
            state,
            id: Uuid::new_v4(),
            peer,
            account_id: None,
            git_protocol: None,
            input: None,
        }
    }

    fn reject(&self, channel: ChannelId, session: &mut Session, err: &dispatch::DispatchError) {
        session.extended_data(
            channel,
            1,
            CryptoVec::from_slice(err.client_message().as_bytes()),
        );
        session.eof(channel);
        session.close(channel);
    }
}

/// Writes to the channel from outside the handler callbacks.
struct ChannelOutput {
    handle: Handle,
    channel: ChannelId,
}

fn channel_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "ssh channel closed")
}

#[async_trait]
impl SessionOutput for ChannelOutput {
    async fn stdout(&self, data: &[u8]) -> io::Result<()> {
        self.handle
            .data(self.channel, CryptoVec::from_slice(data))
            .await
            .map_err(|_| channel_closed())
    }

    async fn stderr(&self, data: &[u8]) -> io::Result<()> {
        self.handle
            .extended_data(self.channel, 1, CryptoVec::from_slice(data))
            .await
            .map_err(|_| channel_closed())
    }

    async fn exit_success(&self) -> io::Result<()> {
        self.handle
            .exit_status_request(self.channel, 0)
            .await
            .map_err(|_| channel_closed())
    }

    async fn close(&self) -> io::Result<()> {
        self.handle
            .eof(self.channel)
            .await
            .map_err(|_| channel_closed())?;
        self.handle
            .close(self.channel)
            .await
            .map_err(|_| channel_closed())
    }
}

/// Adapts the data callbacks into an `AsyncRead` for the stdin copy.
fn client_input(rx: mpsc::Receiver<Bytes>) -> impl tokio::io::AsyncRead + Unpin + Send {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, io::Error>(chunk), rx))
    });
    StreamReader::new(Box::pin(stream))
}

#[async_trait]
impl Handler for SshSession {
    type Error = anyhow::Error;

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        let fp = fingerprint(key);

        match find_key_owner(self.state.store.as_ref(), key) {
            Ok(Some(account_id)) => {
                info!(
                    session = %self.id,
                    peer = ?self.peer,
                    user = %user,
                    account = account_id,
                    fingerprint = %fp,
                    "SSH key accepted"
                );
                self.account_id = Some(account_id);
                Ok(Auth::Accept)
            }
            Ok(None) => {
                warn!(session = %self.id, peer = ?self.peer, fingerprint = %fp, "Unknown SSH key");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
            Err(e) => {
                error!(session = %self.id, fingerprint = %fp, "SSH key lookup failed: {e}");
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn env_request(
        &mut self,
        _channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if variable_name == "GIT_PROTOCOL" {
            debug!(session = %self.id, value = %variable_value, "Client sent GIT_PROTOCOL");
            self.git_protocol = Some(variable_value.to_string());
        }
        Ok(())
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let closed = match &self.input {
            Some(input) => input.send(Bytes::copy_from_slice(data)).await.is_err(),
            None => false,
        };
        if closed {
            // The git process is done reading.
            self.input = None;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.input = None;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);

        let Some(account_id) = self.account_id else {
            warn!(session = %self.id, "exec before authentication");
            session.close(channel);
            return Ok(());
        };

        if self.input.is_some() {
            warn!(session = %self.id, "Second exec on one connection rejected");
            session.close(channel);
            return Ok(());
        }

        let dispatch = match dispatch::prepare(&command, account_id, self.state.access.as_ref()) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                warn!(
                    session = %self.id,
                    account = account_id,
                    command = %command,
                    "Rejected SSH command: {e}"
                );
                self.reject(channel, session, &e);
                return Ok(());
            }
        };

        info!(
            session = %self.id,
            account = account_id,
            repo = %dispatch.repository,
            service = dispatch.service.command_name(),
            "Serving SSH git request"
        );
        session.channel_success(channel);

        let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
        self.input = Some(tx);

        let state = Arc::clone(&self.state);
        let session_id = self.id;
        let git_protocol = self.git_protocol.clone();
        let output = ChannelOutput {
            handle: session.handle(),
            channel,
        };

        tokio::spawn(async move {
            let result = dispatch::execute(
                &dispatch,
                &state.git,
                &state.repo_root,
                git_protocol.as_deref(),
                client_input(rx),
                &output,
                state.observer.as_ref(),
            )
            .await;

            match result {
                Ok(outcome) if outcome.success() => info!(
                    session = %session_id,
                    repo = %dispatch.repository,
                    service = dispatch.service.command_name(),
                    "SSH git request completed"
                ),
                Ok(outcome) => warn!(
                    session = %session_id,
                    repo = %dispatch.repository,
                    code = ?outcome.code(),
                    "SSH git request failed"
                ),
                Err(e) => error!(
                    session = %session_id,
                    repo = %dispatch.repository,
                    "SSH git request aborted: {e}"
                ),
            }
        });

        Ok(())
    }
}
