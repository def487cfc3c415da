use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;

use super::GitService;
use crate::error::{Error, Result};

/// Spawns git subprocesses for both transports.
///
/// Children are killed when their handle is dropped, so an abandoned request
/// or session never leaves a git process behind. Each process gets `timeout`
/// from spawn to exit, covering its pipe traffic as well as the final wait.
#[derive(Debug, Clone)]
pub struct GitRunner {
    git_bin: PathBuf,
    timeout: Duration,
}

impl GitRunner {
    #[must_use]
    pub fn new(git_bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            git_bin: git_bin.into(),
            timeout,
        }
    }

    /// `git <service> --stateless-rpc [--advertise-refs] .` inside a bare repo,
    /// as used by smart HTTP.
    pub fn stateless_rpc(
        &self,
        repo_dir: &Path,
        service: GitService,
        advertise_refs: bool,
        git_protocol: Option<&str>,
    ) -> Result<GitProcess> {
        let mut cmd = self.command(repo_dir);
        cmd.arg(service.subcommand()).arg("--stateless-rpc");

        if advertise_refs {
            cmd.arg("--advertise-refs");
        }

        cmd.arg(".");
        self.spawn(cmd, service, git_protocol)
    }

    /// `git <service> <target>` with `cwd` as working directory, as used by
    /// the SSH dispatcher.
    pub fn serve(
        &self,
        cwd: &Path,
        service: GitService,
        target: &str,
        git_protocol: Option<&str>,
    ) -> Result<GitProcess> {
        let mut cmd = self.command(cwd);
        cmd.arg(service.subcommand()).arg(target);
        self.spawn(cmd, service, git_protocol)
    }

    /// Runs a git command to completion and returns its captured output.
    pub async fn output<I, S>(&self, cwd: &Path, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(cwd);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(Error::Io)?;

        tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)
    }

    /// Refreshes `info/refs` and `objects/info/packs` for dumb HTTP clients.
    pub async fn update_server_info(&self, repo_dir: &Path) -> Result<()> {
        let output = self.output(repo_dir, ["update-server-info"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!("update-server-info failed: {stderr}")));
        }

        Ok(())
    }

    fn command(&self, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.git_bin);
        cmd.current_dir(cwd).kill_on_drop(true);
        cmd
    }

    fn spawn(
        &self,
        mut cmd: Command,
        service: GitService,
        git_protocol: Option<&str>,
    ) -> Result<GitProcess> {
        if let Some(proto) = git_protocol {
            cmd.env("GIT_PROTOCOL", proto);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(Error::Io)?;

        Ok(GitProcess {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            service,
            deadline: Instant::now() + self.timeout,
        })
    }
}

/// A running git subprocess with its three pipes.
///
/// Callers take the pipes they need, drive them through
/// [`GitProcess::bounded`], then call [`GitProcess::wait`]. Dropping stdin
/// closes it, which is how the child learns the request is complete.
pub struct GitProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    service: GitService,
    deadline: Instant,
}

impl GitProcess {
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Kills the child and reaps it; used once the client side is gone.
    pub async fn kill(mut self) -> Result<()> {
        self.child.kill().await.map_err(Error::Io)
    }

    /// Drives `io` until the process deadline.
    ///
    /// `io` should own the pipes it copies; when the deadline passes it is
    /// dropped, the child is killed, and [`Error::Timeout`] is returned.
    pub async fn bounded<F: Future>(&mut self, io: F) -> Result<F::Output> {
        match tokio::time::timeout_at(self.deadline, io).await {
            Ok(output) => Ok(output),
            Err(_) => {
                self.expire().await;
                Err(Error::Timeout)
            }
        }
    }

    /// Waits for exit. Past the deadline the child is killed.
    pub async fn wait(mut self) -> Result<ExitOutcome> {
        drop(self.stdin.take());

        match tokio::time::timeout_at(self.deadline, self.child.wait()).await {
            Ok(status) => Ok(ExitOutcome {
                status: status.map_err(Error::Io)?,
            }),
            Err(_) => {
                self.expire().await;
                Err(Error::Timeout)
            }
        }
    }

    async fn expire(&mut self) {
        tracing::warn!("{} exceeded its time limit", self.service.command_name());
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill timed out {}: {e}", self.service.command_name());
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExitOutcome {
    pub status: ExitStatus,
}

impl ExitOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    #[must_use]
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Copies `input` into the child's stdin and closes it.
pub async fn feed_stdin<R>(mut input: R, mut stdin: ChildStdin) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut input, &mut stdin).await?;
    stdin.shutdown().await?;
    Ok(copied)
}

/// Drains a pipe into memory; used for stderr that only goes to logs.
pub async fn read_all<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

pub async fn init_bare_repo(git: &GitRunner, repo_path: &Path) -> Result<()> {
    let parent = repo_path
        .parent()
        .ok_or_else(|| Error::BadRequest("Repository path has no parent".into()))?;
    fs::create_dir_all(parent).await.map_err(Error::Io)?;

    let mut args = vec![OsStr::new("init"), OsStr::new("--bare")];
    args.push(repo_path.as_os_str());
    let output = git.output(parent, args).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Git(format!("Failed to init bare repo: {stderr}")));
    }

    let head_path = repo_path.join("HEAD");
    fs::write(&head_path, "ref: refs/heads/main\n")
        .await
        .map_err(Error::Io)?;

    Ok(())
}

#[must_use]
pub fn repo_path(repo_root: &Path, repo_name: &str) -> PathBuf {
    repo_root.join(format!("{repo_name}.git"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> GitRunner {
        GitRunner::new("git", Duration::from_secs(30))
    }

    #[test]
    fn test_repo_path() {
        let path = repo_path(Path::new("/data/repositories"), "myrepo");
        assert_eq!(path, Path::new("/data/repositories/myrepo.git"));
    }

    #[tokio::test]
    async fn test_init_bare_repo() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = repo_path(&temp.path().join("repositories"), "demo");

        init_bare_repo(&runner(), &path).await.unwrap();

        assert!(path.join("objects").is_dir());
        let head = std::fs::read_to_string(path.join("HEAD")).unwrap();
        assert_eq!(head, "ref: refs/heads/main\n");
    }

    #[tokio::test]
    async fn test_advertise_refs_exits_cleanly() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = repo_path(temp.path(), "demo");
        let git = runner();
        init_bare_repo(&git, &path).await.unwrap();

        let mut process = git
            .stateless_rpc(&path, GitService::UploadPack, true, None)
            .unwrap();
        let stdout = read_all(process.take_stdout()).await.unwrap();
        let outcome = process.wait().await.unwrap();

        assert!(outcome.success());
        // An empty repository advertises capabilities and ends with a flush.
        assert!(stdout.ends_with(b"0000"));
    }

    #[tokio::test]
    async fn test_feed_stdin_then_wait() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = repo_path(temp.path(), "demo");
        let git = runner();
        init_bare_repo(&git, &path).await.unwrap();

        let mut process = git
            .serve(temp.path(), GitService::ReceivePack, "demo.git", None)
            .unwrap();
        let stdin = process.take_stdin().unwrap();
        let stdout = process.take_stdout();

        // A bare flush tells receive-pack there is nothing to update.
        let (fed, out) = tokio::join!(feed_stdin(&b"0000"[..], stdin), read_all(stdout));
        assert_eq!(fed.unwrap(), 4);
        assert!(!out.unwrap().is_empty());
        assert!(process.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_bounded_kills_stalled_conversation() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = repo_path(temp.path(), "demo");
        let git = GitRunner::new("git", Duration::from_millis(500));
        init_bare_repo(&git, &path).await.unwrap();

        let mut process = git
            .serve(temp.path(), GitService::ReceivePack, "demo.git", None)
            .unwrap();
        let stdin = process.take_stdin().unwrap();
        let stdout = process.take_stdout();

        // The writer half stays open, so receive-pack waits on commands forever.
        let (_client, input) = tokio::io::duplex(64);
        let started = std::time::Instant::now();
        let result = process
            .bounded(async { tokio::join!(feed_stdin(input, stdin), read_all(stdout)) })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!matches!(process.wait().await, Ok(outcome) if outcome.success()));
    }

    #[tokio::test]
    async fn test_failing_command_reports_status() {
        let temp = tempfile::TempDir::new().unwrap();
        let git = runner();

        let process = git
            .serve(temp.path(), GitService::UploadPack, "missing.git", None)
            .unwrap();
        let outcome = process.wait().await.unwrap();

        assert!(!outcome.success());
    }
}
