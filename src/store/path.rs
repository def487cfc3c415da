use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 100;

/// Canonical form of a repository name as used by the store and on disk:
/// lower-cased, without a `.git` suffix.
///
/// Accepts ASCII alphanumerics, `-`, `_` and `.`, rejects a leading `.` so a
/// name can never resolve to `..` or a hidden directory.
pub fn normalize_repo_name(raw: &str) -> Result<String> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(Error::BadRequest(
            "Repository name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::BadRequest(format!(
            "Repository name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }

    if name.starts_with('.') {
        return Err(Error::BadRequest(
            "Repository name cannot start with '.'".to_string(),
        ));
    }

    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if !name.chars().all(valid) {
        return Err(Error::BadRequest(
            "Repository name contains invalid characters".to_string(),
        ));
    }

    Ok(name.to_ascii_lowercase())
}
