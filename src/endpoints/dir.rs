use std::path::{Path, PathBuf};

use super::Endpoint;
use crate::params::Params;
use crate::response::FileOptions;
use crate::{Request, Response};

/// Serves files out of a base directory, keyed by a trailing catch-all
/// segment in the mounting pattern (e.g. `/public/*`).
#[derive(Debug, Clone)]
pub(super) struct DirEndpoint {
    base: PathBuf,
}

impl DirEndpoint {
    pub(super) fn new<P: Into<PathBuf>>(path: P) -> Self {
        DirEndpoint { base: path.into() }
    }
}

#[async_trait::async_trait]
impl Endpoint for DirEndpoint {
    async fn apply(&self, request: Request) -> Result<Response, anyhow::Error> {
        let captured = request
            .extensions()
            .get::<Params>()
            .map(|params| params.get("*").to_owned());

        match captured.and_then(|value| resolve_path(&value, &self.base)) {
            Some(path) => resolve_file(path, request.uri().path(), &request).await,
            None => Ok(Response::empty_404()),
        }
    }
}

fn resolve_path(captured: &str, base: &Path) -> Option<PathBuf> {
    let split = captured.split('/');
    let is_invalid = split.clone().any(|v| v == ".." || v.contains('\\'));
    if is_invalid {
        return None;
    }

    let segments = split.filter(|p| !p.is_empty() && *p != ".");
    let mut buffer = base.to_path_buf();
    segments.for_each(|p| buffer.push(p));
    Some(buffer)
}

async fn resolve_file(mut path: PathBuf, uri_path: &str, request: &Request) -> Result<Response, anyhow::Error> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() && !uri_path.ends_with('/') => {
            return Ok(Response::redirect(
                http::StatusCode::PERMANENT_REDIRECT,
                format!("{uri_path}/"),
            )?);
        }
        Ok(meta) if meta.is_dir() => {
            path.push("index.html");
            if !tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                return Ok(Response::empty_404());
            }
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Response::empty_404()),
        Err(e) => return Err(e.into()),
    }

    Ok(Response::file(&path, request, FileOptions::default()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_rejects_parent_traversal() {
        assert!(resolve_path("../secrets", Path::new("/var/www")).is_none());
    }

    #[test]
    fn resolve_path_rejects_backslashes() {
        assert!(resolve_path("..\\secrets", Path::new("/var/www")).is_none());
    }

    #[test]
    fn resolve_path_joins_segments_under_base() {
        let resolved = resolve_path("css/app.css", Path::new("/var/www")).unwrap();
        assert_eq!(resolved, Path::new("/var/www/css/app.css"));
    }

    #[test]
    fn resolve_path_skips_empty_and_dot_segments() {
        let resolved = resolve_path("//./css//app.css", Path::new("/var/www")).unwrap();
        assert_eq!(resolved, Path::new("/var/www/css/app.css"));
    }
}
