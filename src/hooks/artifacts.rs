use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::PushObserver;
use crate::error::{Error, Result};
use crate::git::{GitRunner, repo_path};

const ARCHIVE_FORMATS: [&str; 2] = ["tar.gz", "zip"];

/// Regenerates the artifacts derived from a repository's refs: the dumb
/// protocol's `info/refs` and `objects/info/packs`, and one `.tar.gz` and
/// `.zip` archive per tag under `<refs_dir>/<repo>/`.
#[derive(Debug, Clone)]
pub struct RefArtifacts {
    git: GitRunner,
    repo_root: PathBuf,
    refs_dir: PathBuf,
}

impl RefArtifacts {
    pub fn new(git: GitRunner, repo_root: PathBuf, refs_dir: PathBuf) -> Self {
        Self {
            git,
            repo_root,
            refs_dir,
        }
    }

    #[must_use]
    pub fn archive_dir(&self, repository: &str) -> PathBuf {
        self.refs_dir.join(repository)
    }

    pub async fn regenerate(&self, repository: &str) -> Result<()> {
        let repo_dir = repo_path(&self.repo_root, repository);
        if !repo_dir.is_dir() {
            return Err(Error::NotFound);
        }

        self.git.update_server_info(&repo_dir).await?;

        let tags = list_tags(repo_dir.clone()).await?;
        if tags.is_empty() {
            return Ok(());
        }

        let archive_dir = self.archive_dir(repository);
        fs::create_dir_all(&archive_dir).await?;

        let mut generated = 0usize;
        for tag in &tags {
            let version = tag.strip_prefix('v').unwrap_or(tag);

            for format in ARCHIVE_FORMATS {
                let target = archive_dir.join(format!("{repository}-{version}.{format}"));
                if target.exists() {
                    continue;
                }

                let args: [OsString; 5] = [
                    "archive".into(),
                    format!("--format={format}").into(),
                    "-o".into(),
                    target.clone().into_os_string(),
                    tag.into(),
                ];

                let output = self.git.output(&repo_dir, args).await?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(repo = %repository, tag = %tag, "git archive failed: {stderr}");
                    continue;
                }
                generated += 1;
            }
        }

        debug!(repo = %repository, tags = tags.len(), generated, "Ref artifacts up to date");
        Ok(())
    }

    /// Moves a repository's archives to follow a rename. Archive file names
    /// embed the repository name, so each file is renamed too.
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old_dir = self.archive_dir(old);
        if !old_dir.is_dir() {
            return Ok(());
        }

        let new_dir = self.archive_dir(new);
        if new_dir.exists() {
            return Err(Error::AlreadyExists);
        }
        fs::rename(&old_dir, &new_dir).await?;

        let old_prefix = format!("{old}-");
        let mut entries = fs::read_dir(&new_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(rest) = file_name.to_str().and_then(|n| n.strip_prefix(&old_prefix)) else {
                continue;
            };
            fs::rename(entry.path(), new_dir.join(format!("{new}-{rest}"))).await?;
        }

        Ok(())
    }

    /// Deletes every archive generated for `repository`.
    pub async fn remove(&self, repository: &str) -> Result<()> {
        let dir = self.archive_dir(repository);
        if dir.is_dir() {
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

impl PushObserver for RefArtifacts {
    fn on_push_completed(&self, repository: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(repo = %repository, "No async runtime; skipping ref artifact regeneration");
            return;
        };

        let this = self.clone();
        let repository = repository.to_string();
        runtime.spawn(async move {
            match this.regenerate(&repository).await {
                Ok(()) => info!(repo = %repository, "Regenerated ref artifacts"),
                Err(e) => warn!(repo = %repository, "Failed to regenerate ref artifacts: {e}"),
            }
        });
    }
}

async fn list_tags(repo_dir: PathBuf) -> Result<Vec<String>> {
    tokio::task::spawn_blocking(move || tag_names(&repo_dir))
        .await
        .map_err(|e| Error::Git(format!("tag listing task failed: {e}")))?
}

fn tag_names(repo_dir: &Path) -> Result<Vec<String>> {
    let repo = git2::Repository::open_bare(repo_dir)?;
    let names = repo.tag_names(None)?;
    Ok(names.iter().flatten().map(str::to_string).collect())
}
