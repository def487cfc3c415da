use std::path::PathBuf;

use clap::Subcommand;

use crate::types::Permission;

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Initialize the server (create database and repository root)
    Init {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a new account
    Add {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Username for the new account
        username: String,

        /// Password for HTTP access (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Grant administrator rights
        #[arg(long)]
        admin: bool,

        /// Allow the account to create repositories
        #[arg(long)]
        can_create_repo: bool,

        /// Skip interactive prompts (requires --password)
        #[arg(long)]
        non_interactive: bool,
    },

    /// Set a new password and rotate the account's auth token
    Passwd {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Account to update
        username: String,

        /// New password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Skip interactive prompts (requires --password)
        #[arg(long)]
        non_interactive: bool,
    },

    /// Remove an account and its keys and memberships
    Remove {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Username to remove
        username: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Create a repository and its bare git directory
    Create {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owning account
        owner: String,

        /// Repository name
        name: String,

        /// Hide from anonymous users
        #[arg(long)]
        private: bool,

        /// Short description
        #[arg(long)]
        description: Option<String>,
    },

    /// Rename a repository on disk and in the database
    Rename {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Current name
        old: String,

        /// New name
        new: String,
    },

    /// Delete a repository, its members, its archives and its git directory
    Delete {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Repository name
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Grant or change a member's permission on a repository
    Set {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Repository name
        repo: String,

        /// Member username
        username: String,

        /// `read` or `read-write`
        permission: Permission,
    },

    /// Remove a member from a repository
    Remove {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Repository name
        repo: String,

        /// Member username
        username: String,
    },

    /// List a repository's members and their permissions
    List {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Repository name
        repo: String,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Register an SSH public key for an account
    Add {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owning account
        username: String,

        /// Label for the key
        title: String,

        /// File holding one key in authorized_keys format
        key_file: PathBuf,
    },

    /// List an account's SSH keys
    List {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owning account
        username: String,
    },

    /// Remove an SSH key by its SHA256 fingerprint
    Remove {
        /// Data directory for database and repositories
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Owning account
        username: String,

        /// Fingerprint as printed by `key list`
        fingerprint: String,
    },
}
