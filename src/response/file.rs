//! Serving files from disk, with `Range` and `If-Modified-Since` support.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::Response;
use crate::entity::HttpEntity;
use crate::Request;

/// Tuning knobs for [`Response::file`].
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Overrides the `Content-Type` that would otherwise be guessed from the
    /// file's extension.
    pub content_type: Option<mime::Mime>,
    /// Sets `Cache-Control`/`Expires` via [`Response::with_cache_control`].
    /// `0` disables caching headers entirely.
    pub max_age: i64,
}

impl Default for FileOptions {
    fn default() -> Self {
        FileOptions {
            content_type: None,
            max_age: 0,
        }
    }
}

impl Response {
    /// Serves the file at `path`, honoring the request's `Range` and
    /// `If-Modified-Since` headers.
    ///
    /// Returns `Ok(None)` if the client's cached copy (per
    /// `If-Modified-Since`) is still fresh -- the caller should respond
    /// `304 Not Modified` with an empty body in that case, which this
    /// function does directly by returning the already-built response.
    pub async fn file(
        path: impl AsRef<Path>,
        request: &Request,
        options: FileOptions,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;
        let len = metadata.len();
        let modified = metadata.modified().ok();

        if let (Some(modified), Some(since)) = (modified, if_modified_since(request)) {
            if truncate_to_secs(modified) <= since {
                let mut response = Response::with_status(http::StatusCode::NOT_MODIFIED);
                set_last_modified(&mut response, modified);
                return Ok(response);
            }
        }

        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream());

        let response = match parse_range(request, len) {
            Some((start, end)) if start <= end && end < len => {
                let chunk_len = end - start + 1;
                file.seek(std::io::SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; chunk_len as usize];
                file.read_exact(&mut buf).await?;

                let mut response = Response::new(http::StatusCode::PARTIAL_CONTENT, hyper::Body::from(buf));
                response
                    .set_header(http::header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))
                    .ok();
                response
            }
            Some(_) => {
                let mut response = Response::new(http::StatusCode::RANGE_NOT_SATISFIABLE, hyper::Body::empty());
                response
                    .set_header(http::header::CONTENT_RANGE, format!("bytes */{len}"))
                    .ok();
                return Ok(response);
            }
            None => {
                let stream = tokio_util::io::ReaderStream::new(file);
                Response::new(http::StatusCode::OK, hyper::Body::wrap_stream(stream))
            }
        };

        let mut response = response;
        response.set_header(http::header::CONTENT_TYPE, content_type.as_ref()).ok();
        response.set_header(http::header::ACCEPT_RANGES, "bytes").ok();
        if let Some(modified) = modified {
            set_last_modified(&mut response, modified);
        }
        if options.max_age > 0 {
            response = response.with_cache_control(options.max_age);
        }
        Ok(response)
    }

    /// Streams an arbitrary reader as the body, without any of the
    /// filesystem-specific metadata [`Self::file`] provides.
    pub fn file_reader<R>(reader: R, content_type: Option<&str>) -> Self
    where
        R: tokio::io::AsyncRead + Send + 'static,
    {
        let stream = tokio_util::io::ReaderStream::new(reader);
        let mut response = Response::new(http::StatusCode::OK, hyper::Body::wrap_stream(stream));
        if let Some(ct) = content_type {
            response.set_header(http::header::CONTENT_TYPE, ct).ok();
        }
        response
    }
}

fn set_last_modified(response: &mut Response, modified: std::time::SystemTime) {
    response
        .set_header(http::header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
        .ok();
}

fn truncate_to_secs(time: std::time::SystemTime) -> std::time::SystemTime {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs)
}

fn if_modified_since(request: &Request) -> Option<std::time::SystemTime> {
    let header = request.header(http::header::IF_MODIFIED_SINCE)?;
    let text = header.to_str().ok()?;
    httpdate::parse_http_date(text).ok()
}

/// Parses a single-range `Range: bytes=start-end` header into an inclusive
/// `(start, end)` pair. Multi-range requests and unsatisfiable syntax are
/// treated as "no range requested" by returning `None`, except when the
/// requested start is past the end of the file, which is surfaced by the
/// caller as `416 Range Not Satisfiable`.
fn parse_range(request: &Request, len: u64) -> Option<(u64, u64)> {
    let header = request.header(http::header::RANGE)?;
    let text = header.to_str().ok()?;
    let spec = text.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    if len == 0 {
        return Some((0, 0));
    }
    match (start, end) {
        ("", "") => None,
        ("", suffix) => {
            let suffix: u64 = suffix.parse().ok()?;
            let start = len.saturating_sub(suffix);
            Some((start, len - 1))
        }
        (start, "") => {
            let start: u64 = start.parse().ok()?;
            Some((start, len - 1))
        }
        (start, end) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            Some((start, end.min(len - 1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_range(value: &str) -> Request {
        Request::get("/").unwrap().with_header(http::header::RANGE, value).unwrap()
    }

    #[test]
    fn parse_range_suffix_form() {
        let request = request_with_range("bytes=-10");
        assert_eq!(parse_range(&request, 100), Some((90, 99)));
    }

    #[test]
    fn parse_range_prefix_form() {
        let request = request_with_range("bytes=10-");
        assert_eq!(parse_range(&request, 100), Some((10, 99)));
    }

    #[test]
    fn parse_range_explicit_form_clamps_to_length() {
        let request = request_with_range("bytes=10-1000");
        assert_eq!(parse_range(&request, 100), Some((10, 99)));
    }

    #[test]
    fn parse_range_rejects_multi_range() {
        let request = request_with_range("bytes=0-1,2-3");
        assert_eq!(parse_range(&request, 100), None);
    }

    #[test]
    fn no_range_header_returns_none() {
        let request = Request::get("/").unwrap();
        assert_eq!(parse_range(&request, 100), None);
    }
}
