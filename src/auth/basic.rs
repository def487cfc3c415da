use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::PasswordHasher;
use crate::store::Store;
use crate::types::Account;

/// Verified in place of a real hash when the username is unknown, so both
/// failures cost one Argon2 verification.
static UNKNOWN_ACCOUNT_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| PasswordHasher::new().hash("gitgate-unknown-account").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub enum CredentialError {
    InvalidScheme,
    InvalidCredentials,
    InternalError,
}

/// Parses `Basic base64(username:password)`.
pub fn parse_basic_auth(header: &str) -> Option<BasicCredentials> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username.is_empty() {
        return None;
    }

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Resolves the `Authorization` header to an account.
///
/// Returns `Ok(None)` when no header was sent. A header that is present but
/// does not name an account with a matching password is an error, so callers
/// can tell "anonymous" from "wrong password".
pub fn authenticate_basic(
    store: &dyn Store,
    auth_header: Option<&str>,
) -> Result<Option<Account>, CredentialError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };

    if !header.starts_with("Basic ") {
        return Err(CredentialError::InvalidScheme);
    }

    let credentials = parse_basic_auth(header).ok_or(CredentialError::InvalidCredentials)?;

    let hasher = PasswordHasher::new();
    let account = store
        .get_account_by_username(&credentials.username)
        .map_err(|_| CredentialError::InternalError)?;

    let Some(account) = account else {
        if let Some(hash) = UNKNOWN_ACCOUNT_HASH.as_deref() {
            let _ = hasher.verify(&credentials.password, hash);
        }
        return Err(CredentialError::InvalidCredentials);
    };

    let verified = hasher
        .verify(&credentials.password, &account.password_hash)
        .map_err(|_| CredentialError::InternalError)?;

    if !verified {
        return Err(CredentialError::InvalidCredentials);
    }

    Ok(Some(account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::NewAccount;
    use tempfile::TempDir;

    fn header(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    #[test]
    fn test_parse_basic_auth() {
        let creds = parse_basic_auth(&header("alice:s3cr3t:with:colons")).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cr3t:with:colons");

        assert!(parse_basic_auth("Bearer abc").is_none());
        assert!(parse_basic_auth("Basic !!!").is_none());
        assert!(parse_basic_auth(&header("no-colon")).is_none());
        assert!(parse_basic_auth(&header(":password")).is_none());
    }

    #[test]
    fn test_authenticate_basic() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let hash = PasswordHasher::new().hash("hunter2").unwrap();
        let account = store
            .create_account(&NewAccount {
                username: "alice".to_string(),
                password_hash: hash,
                auth_token: "token".to_string(),
                can_create_repo: false,
                is_admin: false,
            })
            .unwrap();

        assert!(authenticate_basic(&store, None).unwrap().is_none());

        let resolved = authenticate_basic(&store, Some(&header("alice:hunter2")))
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, account.id);

        assert!(matches!(
            authenticate_basic(&store, Some(&header("alice:wrong"))),
            Err(CredentialError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate_basic(&store, Some(&header("mallory:hunter2"))),
            Err(CredentialError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate_basic(&store, Some("Bearer token")),
            Err(CredentialError::InvalidScheme)
        ));
    }

    #[test]
    fn test_unknown_account_pays_for_a_verification() {
        let stand_in = UNKNOWN_ACCOUNT_HASH.as_deref().unwrap();
        let real = PasswordHasher::new().hash("hunter2").unwrap();

        // Same algorithm and cost parameters as a stored hash.
        let params = |hash: &str| hash.rsplitn(3, '$').nth(2).unwrap().to_string();
        assert_eq!(params(stand_in), params(&real));
        assert!(!PasswordHasher::new().verify("hunter2", stand_in).unwrap());
    }
}
