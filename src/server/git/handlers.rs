use std::io;
use std::path::Path as FsPath;
use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{
    CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, LAST_MODIFIED, PRAGMA,
};
use axum::http::{HeaderMap, StatusCode, Version, response::Builder};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, info, warn};

use super::auth::{self, GitAuthError};
use super::routes::{self, RouteKind, RouteMatch};
use crate::access::Operation;
use crate::git::{GitService, feed_stdin, read_all, repo_path};
use crate::protocol::pkt_line;
use crate::server::AppState;
use crate::store::normalize_repo_name;
use crate::types::Account;

const NO_CACHE_EXPIRES: &str = "Fri, 01 Jan 1980 00:00:00 GMT";
const CACHE_FOREVER: &str = "public, max-age=31536000";

/// Upper bound on an inflated gzip request body.
const MAX_INFLATED_BODY: u64 = 64 * 1024 * 1024;

type RequestInput = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Deserialize)]
pub struct InfoRefsQuery {
    service: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum CachePolicy {
    NoCache,
    Forever,
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn with_cache(builder: Builder, policy: CachePolicy) -> Builder {
    match policy {
        CachePolicy::NoCache => builder
            .header(EXPIRES, NO_CACHE_EXPIRES)
            .header(PRAGMA, "no-cache")
            .header(CACHE_CONTROL, "no-cache"),
        CachePolicy::Forever => builder
            .header(EXPIRES, http_date(Utc::now() + Duration::days(365)))
            .header(CACHE_CONTROL, CACHE_FOREVER),
    }
}

fn git_response(content_type: &str, policy: CachePolicy, body: Body) -> Response {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type);

    finish(with_cache(builder, policy), body)
}

fn finish(builder: Builder, body: Body) -> Response {
    builder.body(body).unwrap_or_else(|e| {
        error!("Failed to build response: {e}");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Git command failed").into_response()
}

/// HTTP/1.1 clients get a proper 405; older ones a plain 400.
fn method_not_allowed(version: Version) -> Response {
    if version == Version::HTTP_11 {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
    } else {
        (StatusCode::BAD_REQUEST, "Bad Request").into_response()
    }
}

fn repository_name(route: &RouteMatch) -> Result<String, GitAuthError> {
    let raw = route
        .repository
        .strip_suffix(".git")
        .unwrap_or(&route.repository);
    normalize_repo_name(raw).map_err(|_| GitAuthError::InvalidRepoName)
}

/// Entry point for everything under `/git/`.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<InfoRefsQuery>,
    request: Request,
) -> Response {
    let Some(route) = routes::resolve(&path) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    if request.method() != route.kind.method() {
        return method_not_allowed(request.version());
    }

    let repository = match repository_name(&route) {
        Ok(name) => name,
        Err(e) => return e.into_response(),
    };

    // Bad credentials fall back to anonymous access; they are only reported
    // when anonymous access would not be enough.
    let (account, rejected_credentials) = match auth::authenticate(request.headers(), &state) {
        Ok(account) => (account, false),
        Err(GitAuthError::InvalidCredentials) => {
            debug!(repo = %repository, "Ignoring rejected credentials");
            (None, true)
        }
        Err(e) => return e.into_response(),
    };

    let ctx = RequestContext {
        state,
        account,
        rejected_credentials,
        repository,
    };

    match route.kind {
        RouteKind::UploadPack => service_rpc(ctx, GitService::UploadPack, request).await,
        RouteKind::ReceivePack => service_rpc(ctx, GitService::ReceivePack, request).await,
        RouteKind::InfoRefs => match query.service.as_deref() {
            None => serve_file(ctx, &route, true).await,
            Some(name) => match GitService::from_http_service(name) {
                Some(service) => advertise_refs(ctx, service, request.headers()).await,
                None => {
                    debug!(repo = %ctx.repository, service = name, "Unsupported service");
                    (StatusCode::FORBIDDEN, "Unsupported service").into_response()
                }
            },
        },
        _ => serve_file(ctx, &route, false).await,
    }
}

struct RequestContext {
    state: Arc<AppState>,
    account: Option<Account>,
    /// An Authorization header was sent but did not verify.
    rejected_credentials: bool,
    repository: String,
}

impl RequestContext {
    /// Authorizes `op` and returns the on-disk repository.
    fn open(&self, op: Operation) -> Result<std::path::PathBuf, GitAuthError> {
        auth::authorize(&self.state, self.account.as_ref(), &self.repository, op).map_err(
            |e| match e {
                GitAuthError::AuthRequired if self.rejected_credentials => {
                    GitAuthError::InvalidCredentials
                }
                e => e,
            },
        )?;

        let dir = repo_path(&self.state.repo_root, &self.repository);
        if !dir.is_dir() {
            warn!(repo = %self.repository, "Repository missing on disk");
            return Err(GitAuthError::RepoNotFound);
        }
        Ok(dir)
    }
}

fn git_protocol(headers: &HeaderMap) -> Option<&str> {
    headers.get("Git-Protocol").and_then(|v| v.to_str().ok())
}

async fn advertise_refs(ctx: RequestContext, service: GitService, headers: &HeaderMap) -> Response {
    let repo_dir = match ctx.open(service.operation()) {
        Ok(dir) => dir,
        Err(e) => return e.into_response(),
    };

    let mut process =
        match ctx
            .state
            .git
            .stateless_rpc(&repo_dir, service, true, git_protocol(headers))
        {
            Ok(p) => p,
            Err(e) => {
                error!(repo = %ctx.repository, "Failed to spawn {}: {e}", service.command_name());
                return server_error();
            }
        };

    let (stdout, stderr) = (process.take_stdout(), process.take_stderr());
    let drained = process
        .bounded(async move { tokio::join!(read_all(stdout), read_all(stderr)) })
        .await;
    let (stdout, stderr) = match drained {
        Ok(pipes) => pipes,
        Err(e) => {
            error!(repo = %ctx.repository, "{} failed: {e}", service.command_name());
            return server_error();
        }
    };

    let outcome = match process.wait().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(repo = %ctx.repository, "{} failed: {e}", service.command_name());
            return server_error();
        }
    };

    let stdout = match stdout {
        Ok(out) if outcome.success() => out,
        Ok(_) => {
            let stderr = stderr.unwrap_or_default();
            warn!(
                repo = %ctx.repository,
                code = ?outcome.code(),
                "{} failed: {}",
                service.command_name(),
                String::from_utf8_lossy(&stderr)
            );
            return server_error();
        }
        Err(e) => {
            error!(repo = %ctx.repository, "Failed to read advertisement: {e}");
            return server_error();
        }
    };

    let mut body = match pkt_line::service_announcement(service) {
        Ok(prefix) => prefix,
        Err(e) => {
            error!("Failed to frame service announcement: {e}");
            return server_error();
        }
    };
    body.extend_from_slice(&stdout);

    git_response(
        service.advertisement_content_type(),
        CachePolicy::NoCache,
        Body::from(body),
    )
}

#[derive(Debug)]
enum BodyError {
    Corrupt(io::Error),
    TooLarge,
}

/// Turns the request body into the subprocess input. Gzip bodies are
/// inflated in full first, up to `limit` bytes, so a corrupt body fails
/// before git is spawned.
async fn request_input(
    headers: &HeaderMap,
    body: Body,
    limit: u64,
) -> Result<RequestInput, BodyError> {
    let stream = body.into_data_stream().map_err(io::Error::other);
    let reader = StreamReader::new(stream);

    let gzipped = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip"));

    if !gzipped {
        return Ok(Box::new(reader));
    }

    let mut decoder = GzipDecoder::new(BufReader::new(reader)).take(limit + 1);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .await
        .map_err(BodyError::Corrupt)?;

    if inflated.len() as u64 > limit {
        return Err(BodyError::TooLarge);
    }

    Ok(Box::new(io::Cursor::new(inflated)))
}

async fn service_rpc(ctx: RequestContext, service: GitService, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if content_type != Some(service.request_content_type()) {
        return (StatusCode::UNAUTHORIZED, "Unsupported content type").into_response();
    }

    let repo_dir = match ctx.open(service.operation()) {
        Ok(dir) => dir,
        Err(e) => return e.into_response(),
    };

    let (parts, body) = request.into_parts();

    let input = match request_input(&parts.headers, body, MAX_INFLATED_BODY).await {
        Ok(input) => input,
        Err(BodyError::TooLarge) => {
            warn!(repo = %ctx.repository, "Inflated request body exceeds {MAX_INFLATED_BODY} bytes");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
        Err(BodyError::Corrupt(e)) => {
            warn!(repo = %ctx.repository, "Failed to decompress request body: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid gzip body").into_response();
        }
    };

    let process = ctx
        .state
        .git
        .stateless_rpc(&repo_dir, service, false, git_protocol(&parts.headers));
    let process = match process {
        Ok(p) => p,
        Err(e) => {
            error!(repo = %ctx.repository, "Failed to spawn {}: {e}", service.command_name());
            return server_error();
        }
    };

    match service {
        GitService::ReceivePack => receive_pack(ctx, process, input).await,
        _ => upload_pack(ctx, service, process, input),
    }
}

/// Streams git's stdout to the client while a supervisor task feeds stdin
/// and reaps the child. Killing the child on timeout ends the stream.
fn upload_pack(
    ctx: RequestContext,
    service: GitService,
    mut process: crate::git::GitProcess,
    input: RequestInput,
) -> Response {
    let (Some(stdin), Some(stdout)) = (process.take_stdin(), process.take_stdout()) else {
        error!(repo = %ctx.repository, "git pipes missing");
        return server_error();
    };
    let stderr = process.take_stderr();
    let repository = ctx.repository;

    tokio::spawn(async move {
        let driven = process
            .bounded(async move { tokio::join!(feed_stdin(input, stdin), read_all(stderr)) })
            .await;
        let stderr = match driven {
            Ok((fed, stderr)) => {
                if let Err(e) = fed {
                    debug!(repo = %repository, "Request body ended early: {e}");
                }
                stderr
            }
            Err(e) => {
                warn!(repo = %repository, "{} aborted: {e}", service.command_name());
                return;
            }
        };

        match process.wait().await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => warn!(
                repo = %repository,
                code = ?outcome.code(),
                "{} failed: {}",
                service.command_name(),
                String::from_utf8_lossy(&stderr.unwrap_or_default())
            ),
            Err(e) => warn!(repo = %repository, "{} failed: {e}", service.command_name()),
        }
    });

    git_response(
        service.content_type(),
        CachePolicy::NoCache,
        Body::from_stream(ReaderStream::new(stdout)),
    )
}

/// Collects the short status report, then notifies the push observer before
/// answering so a client that sees success can rely on the trigger having run.
async fn receive_pack(
    ctx: RequestContext,
    mut process: crate::git::GitProcess,
    input: RequestInput,
) -> Response {
    let Some(stdin) = process.take_stdin() else {
        error!(repo = %ctx.repository, "git stdin missing");
        return server_error();
    };

    let (stdout, stderr) = (process.take_stdout(), process.take_stderr());
    let driven = process
        .bounded(async move {
            tokio::join!(feed_stdin(input, stdin), read_all(stdout), read_all(stderr))
        })
        .await;
    let (fed, stdout, stderr) = match driven {
        Ok(pipes) => pipes,
        Err(e) => {
            error!(repo = %ctx.repository, "git-receive-pack failed: {e}");
            return server_error();
        }
    };
    if let Err(e) = fed {
        warn!(repo = %ctx.repository, "Request body ended early: {e}");
    }

    let outcome = match process.wait().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(repo = %ctx.repository, "git-receive-pack failed: {e}");
            return server_error();
        }
    };

    let report = match stdout {
        Ok(report) if outcome.success() => report,
        Ok(_) => {
            warn!(
                repo = %ctx.repository,
                code = ?outcome.code(),
                "git-receive-pack failed: {}",
                String::from_utf8_lossy(&stderr.unwrap_or_default())
            );
            return server_error();
        }
        Err(e) => {
            error!(repo = %ctx.repository, "Failed to read receive-pack report: {e}");
            return server_error();
        }
    };

    info!(
        repo = %ctx.repository,
        account = ?ctx.account.as_ref().map(|a| a.id),
        "Push accepted"
    );
    ctx.state.observer.on_push_completed(&ctx.repository);

    git_response(
        GitService::ReceivePack.content_type(),
        CachePolicy::NoCache,
        Body::from(report),
    )
}

/// Dumb protocol: serves a file from the bare repository. `refresh` runs
/// `update-server-info` first so `info/refs` reflects the current refs.
async fn serve_file(ctx: RequestContext, route: &RouteMatch, refresh: bool) -> Response {
    let repo_dir = match ctx.open(Operation::Fetch) {
        Ok(dir) => dir,
        Err(e) => return e.into_response(),
    };

    if refresh {
        if let Err(e) = ctx.state.git.update_server_info(&repo_dir).await {
            error!(repo = %ctx.repository, "{e}");
            return server_error();
        }
    }

    send_file(&repo_dir.join(&route.file), route.kind).await
}

async fn send_file(path: &FsPath, kind: RouteKind) -> Response {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => return (StatusCode::NOT_FOUND, "Not Found").into_response(),
    };

    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), "Failed to open: {e}");
            return (StatusCode::NOT_FOUND, "Not Found").into_response();
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, kind.file_content_type())
        .header(CONTENT_LENGTH, metadata.len());

    if let Ok(modified) = metadata.modified() {
        builder = builder.header(LAST_MODIFIED, http_date(modified.into()));
    }

    let policy = if kind.is_immutable() {
        CachePolicy::Forever
    } else {
        CachePolicy::NoCache
    };

    finish(
        with_cache(builder, policy),
        Body::from_stream(ReaderStream::new(file)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_format() {
        let at = DateTime::parse_from_rfc3339("1994-11-06T08:49:37Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(http_date(at), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_method_not_allowed_depends_on_version() {
        assert_eq!(
            method_not_allowed(Version::HTTP_11).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            method_not_allowed(Version::HTTP_10).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_repository_name_strips_suffix() {
        let route = routes::resolve("Project.git/info/refs").unwrap();
        assert_eq!(repository_name(&route).unwrap(), "project");

        let route = routes::resolve("project/info/refs").unwrap();
        assert_eq!(repository_name(&route).unwrap(), "project");

        let route = routes::resolve("a/b.git/info/refs").unwrap();
        assert_eq!(repository_name(&route), Err(GitAuthError::InvalidRepoName));
    }

    fn gzip_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, "gzip".parse().unwrap());
        headers
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_gzip_body_is_inflated() {
        let body = Body::from(gzip(b"0032want 0123456789012345678901234567890123456789\n"));
        let mut input = request_input(&gzip_headers(), body, 1024).await.unwrap();

        let mut out = Vec::new();
        input.read_to_end(&mut out).await.unwrap();
        assert!(out.starts_with(b"0032want "));
    }

    #[tokio::test]
    async fn test_gzip_body_over_limit_is_refused() {
        // Compresses to a few dozen bytes but inflates past the limit.
        let body = Body::from(gzip(&vec![0u8; 4096]));
        let result = request_input(&gzip_headers(), body, 1024).await;
        assert!(matches!(result, Err(BodyError::TooLarge)));

        let body = Body::from(gzip(&vec![0u8; 1024]));
        assert!(request_input(&gzip_headers(), body, 1024).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_gzip_body() {
        let body = Body::from(&b"definitely not gzip"[..]);
        let result = request_input(&gzip_headers(), body, 1024).await;
        assert!(matches!(result, Err(BodyError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_plain_body_passes_through() {
        let mut input = request_input(&HeaderMap::new(), Body::from("0000"), 1)
            .await
            .unwrap();

        let mut out = Vec::new();
        input.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"0000");
    }

    #[test]
    fn test_cache_headers() {
        let response = git_response("text/plain", CachePolicy::NoCache, Body::empty());
        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], NO_CACHE_EXPIRES);

        let response = git_response("text/plain", CachePolicy::Forever, Body::empty());
        let headers = response.headers();
        assert_eq!(headers[CACHE_CONTROL], CACHE_FOREVER);
        assert!(headers[EXPIRES].to_str().unwrap().ends_with("GMT"));
        assert!(headers.get(PRAGMA).is_none());
    }
}
