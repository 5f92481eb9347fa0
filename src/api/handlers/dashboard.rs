//! Member-only pages served from the protected directory.
//!
//! File names are checked by `reject_traversal` before any guard runs, so a
//! traversal attempt is a 400 whether or not the caller is logged in. The
//! handler then resolves the path and refuses anything outside the directory.

use axum::{
    extract::{Extension, Path, Request},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use regex::Regex;
use std::{io::ErrorKind, path::PathBuf, sync::Arc};
use tracing::{debug, error, warn};

use crate::api::error::{ApiError, ResponseFormat};

pub const DASHBOARD_PATH: &str = "/dashboard";
const DASHBOARD_INDEX: &str = "dashboard.html";

/// Root of the files behind `/dashboard`.
#[derive(Clone, Debug)]
pub struct ProtectedFiles {
    root: Arc<PathBuf>,
}

impl ProtectedFiles {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Read `name` if it resolves strictly inside the root.
    async fn read(&self, name: &str) -> Result<String, ApiError> {
        let root = tokio::fs::canonicalize(self.root.as_path())
            .await
            .map_err(|err| {
                ApiError::Upstream(anyhow::Error::new(err).context(format!(
                    "protected directory {} is not accessible",
                    self.root.display()
                )))
            })?;

        let resolved = match tokio::fs::canonicalize(root.join(name)).await {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(ApiError::NotFound),
            Err(err) => return Err(ApiError::Upstream(anyhow::Error::new(err))),
        };
        if resolved == root || !resolved.starts_with(&root) {
            warn!(file = name, "Protected file resolved outside its directory");
            return Err(ApiError::validation("file", "Invalid file name"));
        }

        match tokio::fs::read_to_string(&resolved).await {
            Ok(contents) => Ok(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ApiError::NotFound),
            Err(err) => Err(ApiError::Upstream(anyhow::Error::new(err))),
        }
    }
}

/// Letters, digits, `.`, `_`, `-`, ending in `.html`. No separators, no escapes.
#[must_use]
pub fn valid_file_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._-]+\.html$").is_ok_and(|regex| regex.is_match(name))
}

/// Reject `/dashboard/<file>` requests whose raw file segment is not allowed.
pub async fn reject_traversal(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if let Some(file) = path.strip_prefix("/dashboard/") {
        if !valid_file_name(file) {
            debug!(path, "Rejected dashboard file name");
            let format = ResponseFormat::from_headers(request.headers());
            return ApiError::validation("file", "Invalid file name").negotiate(format);
        }
    }
    next.run(request).await
}

pub async fn dashboard(Extension(files): Extension<ProtectedFiles>) -> Result<Html<String>, ApiError> {
    files.read(DASHBOARD_INDEX).await.map(Html)
}

pub async fn dashboard_file(
    Extension(files): Extension<ProtectedFiles>,
    Path(file): Path<String>,
) -> Result<Html<String>, ApiError> {
    // Checked again here in case the route is mounted without the middleware.
    if !valid_file_name(&file) {
        return Err(ApiError::validation("file", "Invalid file name"));
    }
    files.read(&file).await.map(Html)
}

/// Legacy admin entry point; admins land on the dashboard.
pub async fn admin() -> impl IntoResponse {
    Redirect::to(DASHBOARD_PATH)
}

/// Log once at startup when the dashboard has nothing to serve.
pub fn check_protected_root(files: &ProtectedFiles) {
    if !files.root().join(DASHBOARD_INDEX).is_file() {
        error!(
            "{} not found in {}; /dashboard will return 404",
            DASHBOARD_INDEX,
            files.root().display()
        );
    }
}
