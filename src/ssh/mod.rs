//! Git over SSH.
//!
//! [`prepare`] and [`execute`] hold the whole dispatch policy and do not
//! depend on the SSH library; [`SshSession`] only adapts russh callbacks to
//! them.

mod command;
mod dispatch;
mod server;
mod session;

pub use command::{SshCommand, parse_command};
pub use dispatch::{Dispatch, DispatchError, SessionOutput, execute, prepare};
pub use server::{SshServer, load_or_generate_host_key, serve_ssh, ssh_config, start_ssh_server};
pub use session::SshSession;
