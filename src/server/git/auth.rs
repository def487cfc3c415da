use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::access::{AccessContext, Decision, Operation};
use crate::auth::{CredentialError, authenticate_basic};
use crate::server::AppState;
use crate::types::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitAuthError {
    InvalidCredentials,
    AuthRequired,
    RepoNotFound,
    PermissionDenied,
    InternalError,
    InvalidRepoName,
}

impl GitAuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::RepoNotFound => StatusCode::NOT_FOUND,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRepoName => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid credentials",
            Self::AuthRequired => "Authentication required",
            Self::RepoNotFound => "Repository not found",
            Self::PermissionDenied => "Permission denied",
            Self::InternalError => "Internal server error",
            Self::InvalidRepoName => "Invalid repository name",
        }
    }

    pub fn requires_auth_header(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::AuthRequired)
    }
}

impl IntoResponse for GitAuthError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), self.message()).into_response();

        if self.requires_auth_header() {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"gitgate\""),
            );
        }

        response
    }
}

/// Resolves Basic credentials; `None` means an anonymous request.
pub fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Option<Account>, GitAuthError> {
    let header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());

    authenticate_basic(state.store.as_ref(), header).map_err(|e| match e {
        CredentialError::InvalidScheme | CredentialError::InvalidCredentials => {
            GitAuthError::InvalidCredentials
        }
        CredentialError::InternalError => GitAuthError::InternalError,
    })
}

/// Asks the access policy and maps a refusal to a response.
///
/// Anonymous callers are always challenged. Authenticated callers see 404
/// for repositories they cannot read, whether or not they exist, and 403
/// only when they can read but not push.
pub fn authorize(
    state: &AppState,
    account: Option<&Account>,
    repository: &str,
    op: Operation,
) -> Result<(), GitAuthError> {
    let ctx = AccessContext::new(account.map(|a| a.id), repository);

    let decision = state.access.authorize(&ctx, op).map_err(|e| {
        error!(repo = %repository, "Access check failed: {e}");
        GitAuthError::InternalError
    })?;

    match (decision, account) {
        (Decision::Allowed, _) => Ok(()),
        (_, None) => Err(GitAuthError::AuthRequired),
        (Decision::NotFound, Some(_)) => Err(GitAuthError::RepoNotFound),
        (Decision::Denied, Some(_)) if op == Operation::Push => {
            let can_read = state
                .access
                .fetch_allowed(&ctx)
                .map_err(|e| {
                    error!(repo = %repository, "Access check failed: {e}");
                    GitAuthError::InternalError
                })?
                .is_allowed();

            if can_read {
                Err(GitAuthError::PermissionDenied)
            } else {
                Err(GitAuthError::RepoNotFound)
            }
        }
        (Decision::Denied, Some(_)) => Err(GitAuthError::RepoNotFound),
    }
}
