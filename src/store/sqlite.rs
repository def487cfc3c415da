use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn map_constraint(err: rusqlite::Error) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Error::AlreadyExists
        }
        e => Error::from(e),
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, username, password_hash, auth_token, can_create_repo, is_admin, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        auth_token: row.get(3)?,
        can_create_repo: row.get(4)?,
        is_admin: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const REPOSITORY_COLUMNS: &str = "id, owner_id, name, description, is_private, created_at";

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_private: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn permission_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Permission> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(e.to_string())),
        )
    })
}

const SSH_KEY_COLUMNS: &str = "id, account_id, title, authorized_key, fingerprint, created_at";

fn ssh_key_from_row(row: &Row<'_>) -> rusqlite::Result<SshKey> {
    Ok(SshKey {
        id: row.get(0)?,
        account_id: row.get(1)?,
        title: row.get(2)?,
        authorized_key: row.get(3)?,
        fingerprint: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Account operations

    fn create_account(&self, account: &NewAccount) -> Result<Account> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO accounts (username, password_hash, auth_token, can_create_repo, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                account.username,
                account.password_hash,
                account.auth_token,
                account.can_create_repo,
                account.is_admin,
                format_datetime(&now),
            ],
        )
        .map_err(map_constraint)?;

        Ok(Account {
            id: conn.last_insert_rowid(),
            username: account.username.clone(),
            password_hash: account.password_hash.clone(),
            auth_token: account.auth_token.clone(),
            can_create_repo: account.can_create_repo,
            is_admin: account.is_admin,
            created_at: now,
        })
    }

    fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![id],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"),
            params![username],
            account_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_password(&self, id: i64, password_hash: &str, auth_token: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE accounts SET password_hash = ?1, auth_token = ?2 WHERE id = ?3",
            params![password_hash, auth_token, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_account(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Repository operations

    fn create_repository(&self, repo: &NewRepository) -> Result<Repository> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO repositories (owner_id, name, description, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                repo.owner_id,
                repo.name,
                repo.description,
                repo.is_private,
                format_datetime(&now),
            ],
        )
        .map_err(map_constraint)?;

        Ok(Repository {
            id: conn.last_insert_rowid(),
            owner_id: repo.owner_id,
            name: repo.name.clone(),
            description: repo.description.clone(),
            is_private: repo.is_private,
            created_at: now,
        })
    }

    fn resolve_repository(&self, name: &str) -> Result<Option<Repository>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE name = ?1"),
            params![name],
            repository_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_repositories(&self, owner_id: i64) -> Result<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE owner_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![owner_id], repository_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn rename_repository(&self, id: i64, new_name: &str) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE repositories SET name = ?1 WHERE id = ?2",
                params![new_name, id],
            )
            .map_err(map_constraint)?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_repository(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Membership operations

    fn upsert_member(
        &self,
        account_id: i64,
        repository_id: i64,
        permission: Permission,
    ) -> Result<()> {
        let now = format_datetime(&Utc::now());
        self.conn().execute(
            "INSERT INTO repo_members (account_id, repository_id, permission, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(account_id, repository_id) DO UPDATE SET
                permission = excluded.permission,
                updated_at = excluded.updated_at",
            params![account_id, repository_id, permission.as_str(), now],
        )?;
        Ok(())
    }

    fn resolve_membership(
        &self,
        account_id: i64,
        repository_id: i64,
    ) -> Result<Option<Permission>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT permission FROM repo_members WHERE account_id = ?1 AND repository_id = ?2",
            params![account_id, repository_id],
            |row| permission_from_column(row, 0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_members(&self, repository_id: i64) -> Result<Vec<RepoMember>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT account_id, repository_id, permission, created_at, updated_at
             FROM repo_members WHERE repository_id = ?1 ORDER BY account_id",
        )?;

        let rows = stmt.query_map(params![repository_id], |row| {
            Ok(RepoMember {
                account_id: row.get(0)?,
                repository_id: row.get(1)?,
                permission: permission_from_column(row, 2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn remove_member(&self, account_id: i64, repository_id: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM repo_members WHERE account_id = ?1 AND repository_id = ?2",
            params![account_id, repository_id],
        )?;
        Ok(rows > 0)
    }

    // SSH key operations

    fn create_ssh_key(&self, key: &NewSshKey) -> Result<SshKey> {
        let now = Utc::now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ssh_keys (account_id, title, authorized_key, fingerprint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.account_id,
                key.title,
                key.authorized_key,
                key.fingerprint,
                format_datetime(&now),
            ],
        )
        .map_err(map_constraint)?;

        Ok(SshKey {
            id: conn.last_insert_rowid(),
            account_id: key.account_id,
            title: key.title.clone(),
            authorized_key: key.authorized_key.clone(),
            fingerprint: key.fingerprint.clone(),
            created_at: now,
        })
    }

    fn list_ssh_keys(&self, account_id: i64) -> Result<Vec<SshKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SSH_KEY_COLUMNS} FROM ssh_keys WHERE account_id = ?1 ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![account_id], ssh_key_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_ssh_key(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM ssh_keys WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn all_authorized_keys(&self) -> Result<Vec<AuthorizedKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT account_id, authorized_key FROM ssh_keys ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok(AuthorizedKey {
                account_id: row.get(0)?,
                key_text: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        store
    }

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            auth_token: "token".to_string(),
            can_create_repo: true,
            is_admin: false,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"accounts".to_string()));
        assert!(tables.contains(&"repositories".to_string()));
        assert!(tables.contains(&"repo_members".to_string()));
        assert!(tables.contains(&"ssh_keys".to_string()));
    }

    #[test]
    fn test_account_crud() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let account = store.create_account(&new_account("alice")).unwrap();
        let fetched = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert!(fetched.can_create_repo);

        let by_name = store.get_account_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, account.id);

        store.update_password(account.id, "new-hash", "new-token").unwrap();
        let updated = store.get_account(account.id).unwrap().unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        assert_eq!(updated.auth_token, "new-token");

        assert!(store.delete_account(account.id).unwrap());
        assert!(store.get_account(account.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        store.create_account(&new_account("alice")).unwrap();
        let result = store.create_account(&new_account("alice"));
        assert!(matches!(result, Err(Error::AlreadyExists)));
    }

    #[test]
    fn test_repository_and_membership() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let owner = store.create_account(&new_account("owner")).unwrap();
        let reader = store.create_account(&new_account("reader")).unwrap();

        let repo = store
            .create_repository(&NewRepository {
                owner_id: owner.id,
                name: "project".to_string(),
                description: None,
                is_private: true,
            })
            .unwrap();

        let resolved = store.resolve_repository("project").unwrap().unwrap();
        assert_eq!(resolved.id, repo.id);
        assert!(resolved.is_private);
        assert!(store.resolve_repository("missing").unwrap().is_none());

        assert!(store.resolve_membership(reader.id, repo.id).unwrap().is_none());

        store.upsert_member(reader.id, repo.id, Permission::Read).unwrap();
        assert_eq!(
            store.resolve_membership(reader.id, repo.id).unwrap(),
            Some(Permission::Read)
        );

        store
            .upsert_member(reader.id, repo.id, Permission::ReadWrite)
            .unwrap();
        assert_eq!(
            store.resolve_membership(reader.id, repo.id).unwrap(),
            Some(Permission::ReadWrite)
        );
        assert_eq!(store.list_members(repo.id).unwrap().len(), 1);

        assert!(store.remove_member(reader.id, repo.id).unwrap());
        assert!(store.resolve_membership(reader.id, repo.id).unwrap().is_none());
    }

    #[test]
    fn test_rename_repository() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let owner = store.create_account(&new_account("owner")).unwrap();
        let repo = store
            .create_repository(&NewRepository {
                owner_id: owner.id,
                name: "old".to_string(),
                description: Some("demo".to_string()),
                is_private: false,
            })
            .unwrap();

        store.rename_repository(repo.id, "new").unwrap();
        assert!(store.resolve_repository("old").unwrap().is_none());
        assert_eq!(
            store.resolve_repository("new").unwrap().unwrap().description.as_deref(),
            Some("demo")
        );
        assert!(matches!(
            store.rename_repository(9999, "other"),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_ssh_keys_scan() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp);

        let alice = store.create_account(&new_account("alice")).unwrap();
        let bob = store.create_account(&new_account("bob")).unwrap();

        store
            .create_ssh_key(&NewSshKey {
                account_id: alice.id,
                title: "laptop".to_string(),
                authorized_key: "ssh-ed25519 AAAA1".to_string(),
                fingerprint: "SHA256:one".to_string(),
            })
            .unwrap();
        store
            .create_ssh_key(&NewSshKey {
                account_id: bob.id,
                title: "desktop".to_string(),
                authorized_key: "ssh-ed25519 AAAA2".to_string(),
                fingerprint: "SHA256:two".to_string(),
            })
            .unwrap();

        let duplicate = store.create_ssh_key(&NewSshKey {
            account_id: bob.id,
            title: "again".to_string(),
            authorized_key: "ssh-ed25519 AAAA2".to_string(),
            fingerprint: "SHA256:two".to_string(),
        });
        assert!(matches!(duplicate, Err(Error::AlreadyExists)));

        let keys = store.all_authorized_keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].account_id, alice.id);
        assert_eq!(keys[1].key_text, "ssh-ed25519 AAAA2");

        assert!(store.delete_account(alice.id).unwrap());
        assert_eq!(store.all_authorized_keys().unwrap().len(), 1);
        assert_eq!(store.list_ssh_keys(bob.id).unwrap().len(), 1);
    }
}
