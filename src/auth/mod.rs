mod basic;
mod password;
mod ssh_key;

pub use basic::{BasicCredentials, CredentialError, authenticate_basic, parse_basic_auth};
pub use password::{PasswordHasher, generate_auth_token};
pub use ssh_key::{fingerprint, find_key_owner, keys_match, parse_authorized_key};
