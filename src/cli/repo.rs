use std::path::Path;

use inquire::Confirm;

use crate::git::{GitRunner, init_bare_repo, repo_path};
use crate::hooks::RefArtifacts;
use crate::store::{Store, normalize_repo_name};
use crate::types::NewRepository;

use super::{config_for, init_store, require_account, require_repository};

pub async fn run_repo_create(
    data_dir: &Path,
    owner: String,
    name: String,
    private: bool,
    description: Option<String>,
) -> anyhow::Result<()> {
    let config = config_for(data_dir);
    let store = init_store(data_dir)?;

    let owner = require_account(&store, &owner)?;
    if !owner.can_create_repo && !owner.is_admin {
        anyhow::bail!("User '{}' is not allowed to create repositories", owner.username);
    }

    let name = normalize_repo_name(name.strip_suffix(".git").unwrap_or(&name))?;
    if store.resolve_repository(&name)?.is_some() {
        anyhow::bail!("Repository '{name}' already exists");
    }

    let path = repo_path(&config.repo_root(), &name);
    if path.exists() {
        anyhow::bail!("Directory {} already exists", path.display());
    }

    let git = GitRunner::new(&config.git_bin, config.git_timeout());
    init_bare_repo(&git, &path).await?;

    let repo = match store.create_repository(&NewRepository {
        owner_id: owner.id,
        name: name.clone(),
        description,
        is_private: private,
    }) {
        Ok(repo) => repo,
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(&path) {
                tracing::warn!("Failed to remove {}: {cleanup}", path.display());
            }
            return Err(e.into());
        }
    };

    let visibility = if repo.is_private { "private" } else { "public" };
    println!(
        "Created {visibility} repository '{}' owned by '{}' at {}",
        repo.name,
        owner.username,
        path.display()
    );

    Ok(())
}

/// Renames the bare directory, the database row and the generated archives,
/// in that order. A failed database update moves the directory back.
pub async fn run_repo_rename(data_dir: &Path, old: String, new: String) -> anyhow::Result<()> {
    let config = config_for(data_dir);
    let store = init_store(data_dir)?;

    let repo = require_repository(&store, &old)?;
    let new_name = normalize_repo_name(new.strip_suffix(".git").unwrap_or(&new))?;

    if new_name == repo.name {
        anyhow::bail!("Repository is already named '{new_name}'");
    }
    if store.resolve_repository(&new_name)?.is_some() {
        anyhow::bail!("Repository '{new_name}' already exists");
    }

    let repo_root = config.repo_root();
    let old_path = repo_path(&repo_root, &repo.name);
    let new_path = repo_path(&repo_root, &new_name);
    if new_path.exists() {
        anyhow::bail!("Directory {} already exists", new_path.display());
    }

    std::fs::rename(&old_path, &new_path)?;

    if let Err(e) = store.rename_repository(repo.id, &new_name) {
        if let Err(rollback) = std::fs::rename(&new_path, &old_path) {
            tracing::error!(
                "Failed to restore {} after rename error: {rollback}",
                old_path.display()
            );
        }
        return Err(e.into());
    }

    let git = GitRunner::new(&config.git_bin, config.git_timeout());
    let artifacts = RefArtifacts::new(git, repo_root, config.refs_dir());
    if let Err(e) = artifacts.rename(&repo.name, &new_name).await {
        tracing::warn!("Failed to rename archives for '{}': {e}", repo.name);
    }

    println!("Renamed repository '{}' to '{new_name}'", repo.name);

    Ok(())
}

/// Drops the database row (members cascade), then the archives and the
/// bare directory.
pub async fn run_repo_delete(data_dir: &Path, name: String, yes: bool) -> anyhow::Result<()> {
    let config = config_for(data_dir);
    let store = init_store(data_dir)?;
    let repo = require_repository(&store, &name)?;

    let confirmed = yes
        || Confirm::new(&format!(
            "Delete repository '{}' and all of its history?",
            repo.name
        ))
        .with_default(false)
        .prompt()?;

    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }

    store.delete_repository(repo.id)?;

    let repo_root = config.repo_root();
    let git = GitRunner::new(&config.git_bin, config.git_timeout());
    let artifacts = RefArtifacts::new(git, repo_root.clone(), config.refs_dir());
    if let Err(e) = artifacts.remove(&repo.name).await {
        tracing::warn!("Failed to remove archives for '{}': {e}", repo.name);
    }

    let path = repo_path(&repo_root, &repo.name);
    if path.exists() {
        tokio::fs::remove_dir_all(&path).await?;
    }

    println!("Deleted repository '{}'", repo.name);

    Ok(())
}
