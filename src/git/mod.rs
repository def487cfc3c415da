mod process;
mod service;

pub use process::{
    ExitOutcome, GitProcess, GitRunner, feed_stdin, init_bare_repo, read_all, repo_path,
};
pub use service::GitService;
