mod commands;
mod key;
mod member;
mod repo;
mod user;

pub use commands::{AdminCommands, KeyCommands, MemberCommands, RepoCommands, UserCommands};
pub use key::{run_key_add, run_key_list, run_key_remove};
pub use member::{run_member_list, run_member_remove, run_member_set};
pub use repo::{run_repo_create, run_repo_delete, run_repo_rename};
pub use user::{run_user_add, run_user_passwd, run_user_remove};

use std::path::Path;

use crate::config::ServerConfig;
use crate::store::{SqliteStore, Store};
use crate::types::{Account, Repository};

/// Server config rooted at `data_dir`; only the derived paths are used.
pub fn config_for(data_dir: &Path) -> ServerConfig {
    ServerConfig {
        data_dir: data_dir.to_path_buf(),
        ..ServerConfig::default()
    }
}

/// Initialize store from data directory, checking it exists
pub fn init_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let db_path = config_for(data_dir).db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'gitgate admin init' first.",
            db_path.display()
        );
    }

    SqliteStore::new(&db_path).map_err(Into::into)
}

fn require_account(store: &dyn Store, username: &str) -> anyhow::Result<Account> {
    store
        .get_account_by_username(username)?
        .ok_or_else(|| anyhow::anyhow!("User '{username}' not found"))
}

fn require_repository(store: &dyn Store, name: &str) -> anyhow::Result<Repository> {
    let name = crate::store::normalize_repo_name(name.strip_suffix(".git").unwrap_or(name))?;
    store
        .resolve_repository(&name)?
        .ok_or_else(|| anyhow::anyhow!("Repository '{name}' not found"))
}
