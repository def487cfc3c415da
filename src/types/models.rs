use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Permission;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub auth_token: String,
    pub can_create_repo: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert an account; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub auth_token: String,
    pub can_create_repo: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRepository {
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMember {
    pub account_id: i64,
    pub repository_id: i64,
    pub permission: Permission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub authorized_key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSshKey {
    pub account_id: i64,
    pub title: String,
    pub authorized_key: String,
    pub fingerprint: String,
}

/// One row of the authorized-keys scan done during SSH authentication.
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    pub account_id: i64,
    pub key_text: String,
}
