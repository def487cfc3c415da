use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid permission: {0}")]
    InvalidPermission(String),

    #[error("invalid ssh key: {0}")]
    InvalidKey(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("libgit2 error: {0}")]
    Libgit2(#[from] git2::Error),

    #[error("git command timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;
