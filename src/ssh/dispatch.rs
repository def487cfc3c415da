use std::io;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use super::command::parse_command;
use crate::access::{AccessContext, AccessPolicy, Decision};
use crate::git::{ExitOutcome, GitRunner, GitService, feed_stdin};
use crate::hooks::PushObserver;

const RELAY_BUF_SIZE: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("invalid repository path: {0}")]
    InvalidRepository(String),

    #[error("unknown command: {0}")]
    UnknownVerb(String),

    #[error("access denied to {0}")]
    Denied(String),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] crate::error::Error),

    #[error("session io: {0}")]
    Io(#[from] io::Error),
}

impl DispatchError {
    /// Line written to the client's stderr. Denied and unknown repositories
    /// read the same so that a key holder cannot discover private names.
    pub fn client_message(&self) -> String {
        match self {
            Self::Denied(repo) | Self::NotFound(repo) => {
                format!("ERROR: repository '{repo}' not found or access denied\n")
            }
            Self::Internal(_) | Self::Io(_) => "ERROR: internal server error\n".to_string(),
            other => format!("ERROR: {other}\n"),
        }
    }
}

/// An authorized request, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub account_id: i64,
    pub service: GitService,
    pub repository: String,
}

/// Parses and authorizes an `exec` command. Nothing is spawned here; an
/// `Err` means the session must be closed without running git.
pub fn prepare(
    command: &str,
    account_id: i64,
    policy: &dyn AccessPolicy,
) -> Result<Dispatch, DispatchError> {
    let parsed = parse_command(command)?;

    let ctx = AccessContext::new(Some(account_id), parsed.repository.clone());
    match policy.authorize(&ctx, parsed.service.operation())? {
        Decision::Allowed => Ok(Dispatch {
            account_id,
            service: parsed.service,
            repository: parsed.repository,
        }),
        Decision::Denied => Err(DispatchError::Denied(parsed.repository)),
        Decision::NotFound => Err(DispatchError::NotFound(parsed.repository)),
    }
}

/// The client side of an SSH channel, as seen by [`execute`].
#[async_trait]
pub trait SessionOutput: Send + Sync {
    async fn stdout(&self, data: &[u8]) -> io::Result<()>;

    /// Extended data stream 1.
    async fn stderr(&self, data: &[u8]) -> io::Result<()>;

    /// `exit-status 0`.
    async fn exit_success(&self) -> io::Result<()>;

    /// EOF followed by channel close.
    async fn close(&self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs `git <service> <repo>.git` in `repo_root` and wires it to the
/// channel: client input to stdin, stdout and stderr back to the client.
///
/// The channel is always closed on return. A zero exit with every output
/// byte delivered counts as success: a `receive-pack` then notifies
/// `observer` before `exit-status 0` is sent, so a client that drops the
/// connection early cannot skip the trigger for refs already updated.
pub async fn execute<R>(
    dispatch: &Dispatch,
    git: &GitRunner,
    repo_root: &Path,
    git_protocol: Option<&str>,
    input: R,
    output: &dyn SessionOutput,
    observer: &dyn PushObserver,
) -> Result<ExitOutcome, DispatchError>
where
    R: AsyncRead + Unpin + Send,
{
    let result = run(dispatch, git, repo_root, git_protocol, input, output).await;

    if matches!(&result, Ok(outcome) if outcome.success()) {
        if dispatch.service == GitService::ReceivePack {
            observer.on_push_completed(&dispatch.repository);
        }
        if let Err(e) = output.exit_success().await {
            warn!(repo = %dispatch.repository, "Failed to send exit status: {e}");
        }
    }

    if let Err(e) = output.close().await {
        debug!("Failed to close channel: {e}");
    }

    result
}

async fn run<R>(
    dispatch: &Dispatch,
    git: &GitRunner,
    repo_root: &Path,
    git_protocol: Option<&str>,
    input: R,
    output: &dyn SessionOutput,
) -> Result<ExitOutcome, DispatchError>
where
    R: AsyncRead + Unpin + Send,
{
    let target = format!("{}.git", dispatch.repository);
    let mut process = git.serve(repo_root, dispatch.service, &target, git_protocol)?;

    let stdin = process
        .take_stdin()
        .ok_or_else(|| io::Error::other("child stdin not piped"))?;
    let stdout = process.take_stdout();
    let stderr = process.take_stderr();

    let conversation = async {
        let feed = feed_stdin(input, stdin);
        let relays = async {
            tokio::join!(
                relay(stdout, output, Stream::Stdout),
                relay(stderr, output, Stream::Stderr)
            )
        };
        tokio::pin!(feed, relays);

        // Once git closes its output there is nothing left to feed; a client
        // that never sends EOF must not hold the session open.
        let finished = tokio::select! {
            relayed = &mut relays => Some(relayed),
            fed = &mut feed => {
                if let Err(e) = fed {
                    debug!(repo = %dispatch.repository, "Client input ended with error: {e}");
                }
                None
            }
        };

        match finished {
            Some(relayed) => relayed,
            None => relays.await,
        }
    };
    let (out, err) = process.bounded(conversation).await?;

    if let Err(e) = out.and(err) {
        warn!(repo = %dispatch.repository, "Lost connection to client: {e}");
        if let Err(kill_err) = process.kill().await {
            debug!("Failed to kill {}: {kill_err}", dispatch.service.command_name());
        }
        return Err(DispatchError::Io(e));
    }

    let outcome = process.wait().await?;
    if !outcome.success() {
        warn!(
            repo = %dispatch.repository,
            service = dispatch.service.command_name(),
            code = ?outcome.code(),
            "git exited with failure"
        );
    }

    Ok(outcome)
}

async fn relay<R>(pipe: Option<R>, output: &dyn SessionOutput, stream: Stream) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(0);
    };

    let mut buf = vec![0u8; RELAY_BUF_SIZE];
    let mut total = 0u64;

    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }

        match stream {
            Stream::Stdout => output.stdout(&buf[..n]).await?,
            Stream::Stderr => output.stderr(&buf[..n]).await?,
        }
        total += n as u64;
    }
}
