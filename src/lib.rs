//! # gitgate
//!
//! A git access gateway: serves bare repositories over smart (and dumb) HTTP
//! and over SSH, with one authorization engine shared by both transports.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gitgate::git::GitRunner;
//! use gitgate::hooks::RefArtifacts;
//! use gitgate::server::{AppState, create_router};
//! use gitgate::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/gitgate.db").unwrap();
//! store.initialize().unwrap();
//!
//! let git = GitRunner::new("git", Duration::from_secs(300));
//! let observer = RefArtifacts::new(git.clone(), "./data/repositories".into(), "./data/refs".into());
//! let state = Arc::new(AppState::new(
//!     Arc::new(store),
//!     git,
//!     "./data/repositories".into(),
//!     Arc::new(observer),
//! ));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes CLI module. Disable with `default-features = false`.

pub mod access;
pub mod auth;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod hooks;
pub mod protocol;
pub mod server;
pub mod ssh;
pub mod store;
pub mod types;
