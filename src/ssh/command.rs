use super::DispatchError;
use crate::git::GitService;
use crate::store::normalize_repo_name;

/// A validated `exec` request: which git program to run against which
/// repository (canonical name, no `.git`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub service: GitService,
    pub repository: String,
}

/// Parses `git-upload-pack '/project.git'` and friends.
///
/// The command must split into exactly a verb and a path. The path may carry
/// one leading `/` and must end in `.git`.
pub fn parse_command(raw: &str) -> Result<SshCommand, DispatchError> {
    let words = split_words(raw)?;

    let [verb, path] = words.as_slice() else {
        return Err(DispatchError::MalformedCommand(format!(
            "expected 2 arguments, got {}",
            words.len()
        )));
    };

    let path = path.strip_prefix('/').unwrap_or(path);
    let Some(name) = path.strip_suffix(".git") else {
        return Err(DispatchError::InvalidRepository(path.to_string()));
    };
    let repository =
        normalize_repo_name(name).map_err(|_| DispatchError::InvalidRepository(path.to_string()))?;

    let service =
        GitService::from_command(verb).ok_or_else(|| DispatchError::UnknownVerb(verb.clone()))?;

    Ok(SshCommand {
        service,
        repository,
    })
}

/// POSIX-shell style word splitting, limited to what git clients send:
/// whitespace separation, single quotes, double quotes and backslash escapes.
fn split_words(raw: &str) -> Result<Vec<String>, DispatchError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => {
                        return Err(DispatchError::MalformedCommand(
                            "trailing backslash".to_string(),
                        ));
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}

fn unterminated() -> DispatchError {
    DispatchError::MalformedCommand("unterminated quote".to_string())
}
