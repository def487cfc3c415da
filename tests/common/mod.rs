#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use base64::Engine;
use gitgate::auth::{PasswordHasher, fingerprint};
use gitgate::git::{GitRunner, init_bare_repo, repo_path};
use gitgate::hooks::PushObserver;
use gitgate::protocol::pkt_line;
use gitgate::server::{AppState, create_router};
use gitgate::store::{SqliteStore, Store};
use gitgate::types::{Account, NewAccount, NewRepository, NewSshKey, Repository};
use russh_keys::PublicKeyBase64;
use russh_keys::key::KeyPair;
use tempfile::TempDir;

pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// Records every completed push.
#[derive(Default)]
pub struct CountingObserver {
    pushes: Mutex<Vec<String>>,
}

impl CountingObserver {
    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }
}

impl PushObserver for CountingObserver {
    fn on_push_completed(&self, repository: &str) {
        self.pushes.lock().unwrap().push(repository.to_string());
    }
}

/// An in-process gateway over a scratch data directory.
pub struct TestGateway {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub observer: Arc<CountingObserver>,
    pub state: Arc<AppState>,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(60))
    }

    /// A gateway whose git processes are killed after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store =
            Arc::new(SqliteStore::new(temp_dir.path().join("gitgate.db")).expect("open store"));
        store.initialize().expect("initialize store");

        let observer = Arc::new(CountingObserver::default());
        let state = Arc::new(AppState::new(
            store.clone(),
            GitRunner::new("git", timeout),
            temp_dir.path().join("repositories"),
            observer.clone(),
        ));

        Self {
            temp_dir,
            store,
            observer,
            state,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn repo_dir(&self, name: &str) -> PathBuf {
        repo_path(&self.state.repo_root, name)
    }

    pub fn add_account(&self, username: &str, password: &str) -> Account {
        self.store
            .create_account(&NewAccount {
                username: username.to_string(),
                password_hash: PasswordHasher::new().hash(password).expect("hash password"),
                auth_token: "token".to_string(),
                can_create_repo: true,
                is_admin: false,
            })
            .expect("create account")
    }

    pub async fn add_repo(&self, owner: &Account, name: &str, is_private: bool) -> Repository {
        let repo = self
            .store
            .create_repository(&NewRepository {
                owner_id: owner.id,
                name: name.to_string(),
                description: None,
                is_private,
            })
            .expect("create repository");

        init_bare_repo(&self.state.git, &self.repo_dir(name))
            .await
            .expect("init bare repo");

        repo
    }

    /// Registers a fresh Ed25519 key for `account` and returns the pair.
    pub fn add_ssh_key(&self, account: &Account) -> KeyPair {
        let key = KeyPair::generate_ed25519();
        let public = key.clone_public_key().expect("public half");
        self.store
            .create_ssh_key(&NewSshKey {
                account_id: account.id,
                title: "test".to_string(),
                authorized_key: format!("{} {}", public.name(), public.public_key_base64()),
                fingerprint: fingerprint(&public),
            })
            .expect("create ssh key");
        key
    }

    /// Commits one file and pushes it straight into the bare repository,
    /// bypassing the gateway. Returns the commit id.
    pub fn seed(&self, name: &str) -> String {
        let work = self.work_tree(&format!("seed-{name}"));
        let bare = self.repo_dir(name);
        git(&work, &["push", "-q", bare.to_str().unwrap(), "main"]);
        git(&work, &["rev-parse", "HEAD"])
    }

    /// A fresh working tree with one commit on `main`.
    pub fn work_tree(&self, dir: &str) -> PathBuf {
        let work = self.temp_dir.path().join(dir);
        std::fs::create_dir_all(&work).unwrap();
        git(&work, &["init", "-q", "-b", "main"]);
        std::fs::write(work.join("README.md"), format!("{dir}\n")).unwrap();
        git(&work, &["add", "README.md"]);
        git(&work, &["commit", "-q", "-m", "initial"]);
        work
    }

    pub fn pushes(&self) -> Vec<String> {
        self.observer.pushes()
    }
}

/// Runs git with a fixed identity and returns trimmed stdout.
pub fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// The bytes a client sends to `receive-pack` to create `refs/heads/main`
/// at HEAD of `work`: one command line, a flush, then the pack.
pub fn push_request(work: &Path) -> (String, Vec<u8>) {
    let sha = git(work, &["rev-parse", "HEAD"]);

    let mut child = Command::new("git")
        .args(["pack-objects", "--stdout", "--revs", "-q"])
        .current_dir(work)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn pack-objects");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(format!("{sha}\n").as_bytes())
        .unwrap();
    let pack = child.wait_with_output().expect("pack-objects");
    assert!(pack.status.success());

    let command = format!("{ZERO_OID} {sha} refs/heads/main\0report-status\n");
    let mut body = pkt_line::encode(command).unwrap();
    body.extend_from_slice(&pkt_line::flush());
    body.extend_from_slice(&pack.stdout);

    (sha, body)
}

/// Reads a ref from a bare repository, `None` if it does not exist.
pub fn read_ref(bare: &Path, reference: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "-q", reference])
        .current_dir(bare)
        .output()
        .expect("run git");
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}
