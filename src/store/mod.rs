mod path;
mod schema;
mod sqlite;

pub use path::normalize_repo_name;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// The git gateway only relies on the query half of this trait
/// (`resolve_repository`, `resolve_membership`, `all_authorized_keys` and
/// `get_account_by_username`); the rest backs the admin CLI.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Account operations
    fn create_account(&self, account: &NewAccount) -> Result<Account>;
    fn get_account(&self, id: i64) -> Result<Option<Account>>;
    fn get_account_by_username(&self, username: &str) -> Result<Option<Account>>;
    fn update_password(&self, id: i64, password_hash: &str, auth_token: &str) -> Result<()>;
    fn delete_account(&self, id: i64) -> Result<bool>;

    // Repository operations
    fn create_repository(&self, repo: &NewRepository) -> Result<Repository>;
    fn resolve_repository(&self, name: &str) -> Result<Option<Repository>>;
    fn list_repositories(&self, owner_id: i64) -> Result<Vec<Repository>>;
    fn rename_repository(&self, id: i64, new_name: &str) -> Result<()>;
    fn delete_repository(&self, id: i64) -> Result<bool>;

    // Membership operations
    fn upsert_member(&self, account_id: i64, repository_id: i64, permission: Permission)
    -> Result<()>;
    fn resolve_membership(&self, account_id: i64, repository_id: i64)
    -> Result<Option<Permission>>;
    fn list_members(&self, repository_id: i64) -> Result<Vec<RepoMember>>;
    fn remove_member(&self, account_id: i64, repository_id: i64) -> Result<bool>;

    // SSH key operations
    fn create_ssh_key(&self, key: &NewSshKey) -> Result<SshKey>;
    fn list_ssh_keys(&self, account_id: i64) -> Result<Vec<SshKey>>;
    fn delete_ssh_key(&self, id: i64) -> Result<bool>;
    fn all_authorized_keys(&self) -> Result<Vec<AuthorizedKey>>;
}
