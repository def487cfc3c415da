pub const SCHEMA: &str = r#"
-- Accounts authenticate over HTTP (password) and SSH (keys)
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    auth_token TEXT NOT NULL,
    can_create_repo INTEGER NOT NULL DEFAULT 0,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Repositories; each has a bare repo on disk named <name>.git
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    name TEXT NOT NULL UNIQUE,
    description TEXT,

    -- Visibility
    is_private INTEGER NOT NULL DEFAULT 0,  -- If 0, anonymous fetch allowed

    created_at TEXT DEFAULT (datetime('now'))
);

-- Members: non-owner access to a repository
CREATE TABLE IF NOT EXISTS repo_members (
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    permission TEXT NOT NULL CHECK (permission IN ('read', 'read-write')),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (account_id, repository_id)
);

-- SSH public keys in authorized_keys format
CREATE TABLE IF NOT EXISTS ssh_keys (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    authorized_key TEXT NOT NULL UNIQUE,
    fingerprint TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_repositories_owner ON repositories(owner_id);
CREATE INDEX IF NOT EXISTS idx_repo_members_repository ON repo_members(repository_id);
CREATE INDEX IF NOT EXISTS idx_ssh_keys_account ON ssh_keys(account_id);
"#;
