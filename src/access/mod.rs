//! Repository authorization shared by the HTTP and SSH transports.
//!
//! Both transports build an [`AccessContext`] and ask an [`AccessPolicy`];
//! neither carries its own permission rules. Every call reads ownership and
//! membership fresh from the store.

use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;
use crate::types::{EffectivePermission, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
    NotFound,
}

impl Decision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Who is asking, and about which repository. `account_id` is `None` for
/// anonymous callers.
#[derive(Debug, Clone)]
pub struct AccessContext {
    pub account_id: Option<i64>,
    pub repository: String,
}

impl AccessContext {
    pub fn new(account_id: Option<i64>, repository: impl Into<String>) -> Self {
        Self {
            account_id,
            repository: repository.into(),
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn fetch_allowed(&self, ctx: &AccessContext) -> Result<Decision>;
    fn push_allowed(&self, ctx: &AccessContext) -> Result<Decision>;

    fn authorize(&self, ctx: &AccessContext, op: Operation) -> Result<Decision> {
        match op {
            Operation::Fetch => self.fetch_allowed(ctx),
            Operation::Push => self.push_allowed(ctx),
        }
    }
}

/// The policy backed by the persistence layer.
pub struct StoreAccessPolicy {
    store: Arc<dyn Store>,
}

impl StoreAccessPolicy {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn evaluate(&self, ctx: &AccessContext, op: Operation) -> Result<Decision> {
        let Some(repo) = self.store.resolve_repository(&ctx.repository)? else {
            return Ok(Decision::NotFound);
        };

        if op == Operation::Fetch && !repo.is_private {
            return Ok(Decision::Allowed);
        }

        let permission = match ctx.account_id {
            Some(account_id) => effective_permission(self.store.as_ref(), account_id, &repo)?,
            None => None,
        };

        Ok(decide(&repo, permission, op))
    }
}

impl AccessPolicy for StoreAccessPolicy {
    fn fetch_allowed(&self, ctx: &AccessContext) -> Result<Decision> {
        self.evaluate(ctx, Operation::Fetch)
    }

    fn push_allowed(&self, ctx: &AccessContext) -> Result<Decision> {
        self.evaluate(ctx, Operation::Push)
    }
}

/// Ownership first, then the member row.
pub fn effective_permission(
    store: &dyn Store,
    account_id: i64,
    repo: &Repository,
) -> Result<Option<EffectivePermission>> {
    if repo.owner_id == account_id {
        return Ok(Some(EffectivePermission::Owner));
    }

    Ok(store
        .resolve_membership(account_id, repo.id)?
        .map(EffectivePermission::Member))
}

/// The decision table. `permission` is `None` for anonymous callers and for
/// accounts with neither ownership nor membership.
#[must_use]
pub fn decide(
    repo: &Repository,
    permission: Option<EffectivePermission>,
    op: Operation,
) -> Decision {
    let allowed = match op {
        Operation::Fetch => !repo.is_private || permission.is_some_and(|p| p.allows_read()),
        Operation::Push => permission.is_some_and(|p| p.allows_write()),
    };

    if allowed {
        Decision::Allowed
    } else {
        Decision::Denied
    }
}
