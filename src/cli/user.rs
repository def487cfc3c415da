use std::path::Path;

use inquire::{Confirm, Password};

use crate::auth::{PasswordHasher, generate_auth_token};
use crate::store::Store;
use crate::types::NewAccount;

use super::{init_store, require_account};

fn validate_username(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Username cannot be empty".into());
    }
    if name.len() > 64 {
        return Err("Username cannot exceed 64 characters".into());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("Username may only contain letters, digits, '-', '_' and '.'".into());
    }
    Ok(())
}

/// Takes `--password` or prompts for one; empty passwords are refused.
fn resolve_password(
    password: Option<String>,
    non_interactive: bool,
    prompt: &str,
) -> anyhow::Result<String> {
    let password = match password {
        Some(p) => p,
        None if non_interactive => {
            anyhow::bail!("--password is required in non-interactive mode");
        }
        None => Password::new(prompt)
            .with_validator(|input: &str| {
                if input.is_empty() {
                    Ok(inquire::validator::Validation::Invalid(
                        "Password cannot be empty".into(),
                    ))
                } else {
                    Ok(inquire::validator::Validation::Valid)
                }
            })
            .prompt()?,
    };

    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    Ok(password)
}

pub fn run_user_add(
    data_dir: &Path,
    username: String,
    password: Option<String>,
    admin: bool,
    can_create_repo: bool,
    non_interactive: bool,
) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;

    validate_username(&username).map_err(anyhow::Error::msg)?;

    if store.get_account_by_username(&username)?.is_some() {
        anyhow::bail!("User '{username}' already exists");
    }

    let password = resolve_password(password, non_interactive, "Password:")?;

    let account = store.create_account(&NewAccount {
        username: username.clone(),
        password_hash: PasswordHasher::new().hash(&password)?,
        auth_token: generate_auth_token(),
        can_create_repo: can_create_repo || admin,
        is_admin: admin,
    })?;

    println!("Created user '{}' (id {})", account.username, account.id);

    Ok(())
}

/// Replaces the password hash. The auth token is rotated with it.
pub fn run_user_passwd(
    data_dir: &Path,
    username: String,
    password: Option<String>,
    non_interactive: bool,
) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let account = require_account(&store, &username)?;

    let password = resolve_password(password, non_interactive, "New password:")?;

    store.update_password(
        account.id,
        &PasswordHasher::new().hash(&password)?,
        &generate_auth_token(),
    )?;
    println!("Updated password for '{username}'");

    Ok(())
}

pub fn run_user_remove(data_dir: &Path, username: String, yes: bool) -> anyhow::Result<()> {
    let store = init_store(data_dir)?;
    let account = require_account(&store, &username)?;

    let owned = store.list_repositories(account.id)?;
    if !owned.is_empty() {
        let names: Vec<&str> = owned.iter().map(|r| r.name.as_str()).collect();
        anyhow::bail!(
            "User '{username}' still owns repositories: {}",
            names.join(", ")
        );
    }

    let confirmed = yes
        || Confirm::new(&format!("Remove user '{username}' and their SSH keys?"))
            .with_default(false)
            .prompt()?;

    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }

    store.delete_account(account.id)?;
    println!("Removed user '{username}'");

    Ok(())
}
