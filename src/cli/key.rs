use std::path::Path;

use crate::auth::{fingerprint, parse_authorized_key};
use crate::error::Error;
use crate::store::Store;
use crate::types::NewSshKey;

use super::{init_store, require_account};

pub fn run_key_add(
    data_dir: &Path,
    username: String,
    title: String,
    key_file: &Path,
) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let account = require_account(&store, &username)?;

    let content = std::fs::read_to_string(key_file)?;
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| anyhow::anyhow!("No key found in {}", key_file.display()))?;

    let key = parse_authorized_key(line)?;
    let fp = fingerprint(&key);

    let created = store.create_ssh_key(&NewSshKey {
        account_id: account.id,
        title,
        authorized_key: line.to_string(),
        fingerprint: fp.clone(),
    });

    match created {
        Ok(key) => {
            println!("Added key '{}' ({fp}) for '{username}'", key.title);
            Ok(())
        }
        Err(Error::AlreadyExists) => anyhow::bail!("Key {fp} is already registered"),
        Err(e) => Err(e.into()),
    }
}

pub fn run_key_list(data_dir: &Path, username: String) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let account = require_account(&store, &username)?;

    let keys = store.list_ssh_keys(account.id)?;
    if keys.is_empty() {
        println!("No SSH keys for '{username}'");
        return Ok(());
    }

    for key in keys {
        println!(
            "{}\t{}\t{}",
            key.fingerprint,
            key.title,
            key.created_at.format("%Y-%m-%d")
        );
    }

    Ok(())
}

pub fn run_key_remove(data_dir: &Path, username: String, fingerprint: String) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let account = require_account(&store, &username)?;

    let key = store
        .list_ssh_keys(account.id)?
        .into_iter()
        .find(|k| k.fingerprint == fingerprint)
        .ok_or_else(|| anyhow::anyhow!("'{username}' has no key {fingerprint}"))?;

    store.delete_ssh_key(key.id)?;
    println!("Removed key '{}' ({fingerprint}) from '{username}'", key.title);

    Ok(())
}
