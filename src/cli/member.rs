use std::path::Path;

use crate::store::Store;
use crate::types::Permission;

use super::{init_store, require_account, require_repository};

pub fn run_member_set(
    data_dir: &Path,
    repo: String,
    username: String,
    permission: Permission,
) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let repo = require_repository(&store, &repo)?;
    let account = require_account(&store, &username)?;

    if repo.owner_id == account.id {
        anyhow::bail!("'{username}' owns '{}' and already has full access", repo.name);
    }

    store.upsert_member(account.id, repo.id, permission)?;
    println!("Granted {permission} on '{}' to '{username}'", repo.name);

    Ok(())
}

pub fn run_member_list(data_dir: &Path, repo: String) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let repo = require_repository(&store, &repo)?;

    let owner = store
        .get_account(repo.owner_id)?
        .map_or_else(|| format!("#{}", repo.owner_id), |a| a.username);
    println!("{owner}\towner");

    for member in store.list_members(repo.id)? {
        let name = store
            .get_account(member.account_id)?
            .map_or_else(|| format!("#{}", member.account_id), |a| a.username);
        println!("{name}\t{}", member.permission);
    }

    Ok(())
}

pub fn run_member_remove(data_dir: &Path, repo: String, username: String) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let repo = require_repository(&store, &repo)?;
    let account = require_account(&store, &username)?;

    if !store.remove_member(account.id, repo.id)? {
        anyhow::bail!("'{username}' is not a member of '{}'", repo.name);
    }

    println!("Removed '{username}' from '{}'", repo.name);

    Ok(())
}
