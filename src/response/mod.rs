//! The response abstraction.
//!
//! `under`'s `Response` was already a thin, eager wrapper around
//! `http::Response<hyper::Body>`; this keeps that shape (and its
//! `IntoResponse`/`HttpEntity` ergonomics) and generalizes the body side to
//! cover the streaming variants the design calls for. `hyper::Body` is
//! itself an eager value -- there's no way to defer "what kind of body is
//! this" past construction time the way a `Render(writer, request)` trait
//! object would -- so the streaming variants build their body immediately,
//! spawning a task that drives a channel, and observe `Sender::closed()` for
//! cancellation instead of a passed-in cancellation signal.

mod file;
#[cfg(feature = "sse")]
mod sse;
mod stream;

pub use self::file::FileOptions;
#[cfg(feature = "sse")]
pub use self::sse::{SseOptions, SseSink};
pub use self::stream::{NdjsonOptions, StreamSink};

use crate::entity::HttpEntity;
use std::convert::Infallible;

/// A builder/forwarder, mirroring `under`'s macro of the same purpose: each
/// arm defines a method that simply delegates to the same-named method on
/// the inner `http::Response`.
macro_rules! forward {
    () => {};
    (
        $(#[$m:meta])* $v:vis fn $name:ident(&self $(, $pn:ident: $pt:ty)*) -> $ret:ty;
        $($tail:tt)*
    ) => {
        $(#[$m])* $v fn $name(&self $(, $pn: $pt)*) -> $ret {
            (self.0).$name($($pn),*)
        }
        forward! { $($tail)* }
    };
    (
        $(#[$m:meta])* $v:vis fn $name:ident(&mut self $(, $pn:ident: $pt:ty)*) -> $ret:ty;
        $($tail:tt)*
    ) => {
        $(#[$m])* $v fn $name(&mut self $(, $pn: $pt)*) -> $ret {
            (self.0).$name($($pn),*)
        }
        forward! { $($tail)* }
    };
}

/// Represents an HTTP response.
///
/// A status, a header map, and a body. Constructors set sensible defaults
/// for each variant described by the design (a default `Content-Type`, a
/// default status); builder methods layer on top without overwriting a
/// header the caller already set explicitly.
#[derive(Debug)]
pub struct Response(http::Response<hyper::Body>);

impl Response {
    /// Builds a response from an explicit status and body, with no headers
    /// set.
    pub fn new(status: http::StatusCode, body: impl Into<hyper::Body>) -> Self {
        let mut response = http::Response::new(body.into());
        *response.status_mut() = status;
        Response(response)
    }

    /// `200 OK`, empty body.
    pub fn empty_200() -> Self {
        Self::new(http::StatusCode::OK, hyper::Body::empty())
    }

    /// `204 No Content`, empty body.
    pub fn empty_204() -> Self {
        Self::new(http::StatusCode::NO_CONTENT, hyper::Body::empty())
    }

    /// `400 Bad Request`, empty body.
    pub fn empty_400() -> Self {
        Self::new(http::StatusCode::BAD_REQUEST, hyper::Body::empty())
    }

    /// `404 Not Found`, empty body.
    pub fn empty_404() -> Self {
        Self::new(http::StatusCode::NOT_FOUND, hyper::Body::empty())
    }

    /// `405 Method Not Allowed`, empty body.
    pub fn empty_405() -> Self {
        Self::new(http::StatusCode::METHOD_NOT_ALLOWED, hyper::Body::empty())
    }

    /// `500 Internal Server Error`, empty body.
    pub fn empty_500() -> Self {
        Self::new(http::StatusCode::INTERNAL_SERVER_ERROR, hyper::Body::empty())
    }

    /// A buffered `text/plain; charset=utf-8` body, `200 OK` unless the
    /// body is empty.
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// let response = Response::text("hello, world");
    /// assert_eq!(response.status(), http::StatusCode::OK);
    /// ```
    pub fn text(body: impl Into<String>) -> Self {
        let mut response = Self::new(http::StatusCode::OK, hyper::Body::from(body.into()));
        response.set_default_content_type("text/plain; charset=utf-8");
        response
    }

    /// A buffered `text/html; charset=utf-8` body.
    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Self::new(http::StatusCode::OK, hyper::Body::from(body.into()));
        response.set_default_content_type("text/html; charset=utf-8");
        response
    }

    /// A buffered body with a caller-supplied content type (the caller is
    /// expected to set `Content-Type` themselves via [`Self::with_header`]).
    pub fn bytes(body: impl Into<bytes::Bytes>) -> Self {
        Self::new(http::StatusCode::OK, hyper::Body::from(body.into()))
    }

    /// A buffered `application/json; charset=utf-8` body.
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// let response = Response::json(&serde_json::json!({ "ok": true })).unwrap();
    /// assert_eq!(response.status(), http::StatusCode::OK);
    /// ```
    #[cfg(feature = "json")]
    pub fn json<V: serde::Serialize>(value: &V) -> Result<Self, crate::error::RenderError> {
        let body =
            serde_json::to_vec(value).map_err(crate::error::RenderError::Json)?;
        let mut response = Self::new(http::StatusCode::OK, hyper::Body::from(body));
        response.set_default_content_type("application/json; charset=utf-8");
        Ok(response)
    }

    /// A buffered, caller-rendered body (typically HTML produced by a
    /// template engine external to this crate). `render` writes its output
    /// into the provided buffer.
    pub fn template<F>(render: F) -> Result<Self, crate::error::RenderError>
    where
        F: FnOnce(&mut Vec<u8>) -> std::fmt::Result,
    {
        let mut buf = Vec::new();
        render(&mut buf).map_err(|_| crate::error::RenderError::Other(anyhow::anyhow!(
            "template render failed"
        )))?;
        let mut response = Self::new(http::StatusCode::OK, hyper::Body::from(buf));
        response.set_default_content_type("text/html; charset=utf-8");
        Ok(response)
    }

    /// A redirect. `status` must be in `300..=399`; any other value falls
    /// back to `302 Found`.
    pub fn redirect(status: http::StatusCode, location: impl AsRef<str>) -> Result<Self, http::Error> {
        let status = if (300..400).contains(&status.as_u16()) {
            status
        } else {
            http::StatusCode::FOUND
        };
        let mut response = Self::new(status, hyper::Body::empty());
        response.set_header(http::header::LOCATION, location.as_ref())?;
        Ok(response)
    }

    /// A body-less response at the given status (`0` maps to `200 OK`).
    pub fn with_status(status: http::StatusCode) -> Self {
        let status = if status.as_u16() == 0 {
            http::StatusCode::OK
        } else {
            status
        };
        Self::new(status, hyper::Body::empty())
    }

    /// An attachment: sets `Content-Disposition: attachment` with a
    /// sanitized filename.
    pub fn attachment(
        filename: &str,
        content_type: Option<&str>,
        body: impl Into<bytes::Bytes>,
    ) -> Result<Self, http::Error> {
        let mut response = Self::new(http::StatusCode::OK, hyper::Body::from(body.into()));
        if let Some(ct) = content_type {
            response.set_header(http::header::CONTENT_TYPE, ct)?;
        }
        let sanitized = sanitize_filename(filename);
        response.set_header(
            http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{sanitized}\""),
        )?;
        Ok(response)
    }

    /// A `text/csv` attachment; shorthand for [`Self::attachment`].
    pub fn csv(filename: &str, body: impl Into<bytes::Bytes>) -> Result<Self, http::Error> {
        Self::attachment(filename, Some("text/csv; charset=utf-8"), body)
    }

    /// Sets `Content-Type` only if it has not already been set -- the
    /// response layer never overwrites a caller-supplied header.
    pub(crate) fn set_default_content_type(&mut self, value: &'static str) {
        if !self.0.headers().contains_key(http::header::CONTENT_TYPE) {
            self.0
                .headers_mut()
                .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static(value));
        }
    }

    /// Sets `Cache-Control`/`Expires` for a positive `max_age` (seconds), or
    /// the standard trio of no-cache headers for a non-positive one.
    #[must_use]
    pub fn with_cache_control(mut self, max_age: i64) -> Self {
        let headers = self.0.headers_mut();
        if max_age > 0 {
            headers.insert(
                http::header::CACHE_CONTROL,
                http::HeaderValue::from_str(&format!("public, max-age={max_age}")).unwrap(),
            );
            let expires = httpdate::fmt_http_date(
                std::time::SystemTime::now() + std::time::Duration::from_secs(max_age as u64),
            );
            if let Ok(value) = http::HeaderValue::from_str(&expires) {
                headers.insert(http::header::EXPIRES, value);
            }
        } else {
            headers.insert(
                http::header::CACHE_CONTROL,
                http::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            );
            headers.insert(http::header::PRAGMA, http::HeaderValue::from_static("no-cache"));
            headers.insert(http::header::EXPIRES, http::HeaderValue::from_static("0"));
        }
        self
    }

    /// A quick, approximate status for logging -- used by
    /// [`crate::middleware::TraceMiddleware`] so it doesn't need to own the
    /// response to describe it.
    pub(crate) fn status_hint(&self) -> http::StatusCode {
        self.0.status()
    }

    forward! {
        /// Returns the status code of this response.
        #[inline]
        pub fn status(&self) -> http::StatusCode;
        /// Returns a mutable reference to the status code of this response.
        #[inline]
        pub fn status_mut(&mut self) -> &mut http::StatusCode;
        /// Returns a reference to the associated extensions.
        #[inline]
        pub fn extensions(&self) -> &http::Extensions;
        /// Returns a mutable reference to the associated extensions.
        #[inline]
        pub fn extensions_mut(&mut self) -> &mut http::Extensions;
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::empty_200()
    }
}

impl HttpEntity for Response {
    fn body_mut(&mut self) -> &mut hyper::Body {
        self.0.body_mut()
    }

    fn headers(&self) -> &http::HeaderMap {
        self.0.headers()
    }

    fn headers_mut(&mut self) -> &mut http::HeaderMap {
        self.0.headers_mut()
    }
}

impl From<Response> for http::Response<hyper::Body> {
    fn from(r: Response) -> Self {
        r.0
    }
}

impl From<http::Response<hyper::Body>> for Response {
    fn from(r: http::Response<hyper::Body>) -> Self {
        Response(r)
    }
}

/// Converts a handler's return value into a [`Response`]. Blanket-implemented
/// for `Result<R, E>` (any `E: Into<anyhow::Error>`) so handlers can return
/// `Result<Response, anyhow::Error>` or any narrower error type, and for
/// `Infallible` so a handler that cannot fail need not wrap its return value.
pub trait IntoResponse {
    /// Performs the conversion.
    fn into_response(self) -> Result<Response, anyhow::Error>;
}

impl IntoResponse for Response {
    fn into_response(self) -> Result<Response, anyhow::Error> {
        Ok(self)
    }
}

impl<R, E> IntoResponse for Result<R, E>
where
    R: IntoResponse,
    E: Into<anyhow::Error>,
{
    fn into_response(self) -> Result<Response, anyhow::Error> {
        self.map_err(Into::into).and_then(IntoResponse::into_response)
    }
}

impl IntoResponse for Infallible {
    fn into_response(self) -> Result<Response, anyhow::Error> {
        match self {}
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\r' | '\n' | '\0' | '"'))
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "unnamed".to_owned(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_sets_default_content_type() {
        let response = Response::text("hi");
        assert_eq!(
            response.header(http::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn set_default_content_type_does_not_overwrite() {
        let mut response = Response::new(http::StatusCode::OK, hyper::Body::empty());
        response
            .set_header(http::header::CONTENT_TYPE, "application/custom")
            .unwrap();
        response.set_default_content_type("text/plain; charset=utf-8");
        assert_eq!(
            response.header(http::header::CONTENT_TYPE).unwrap(),
            "application/custom"
        );
    }

    #[test]
    fn redirect_falls_back_to_302_for_non_redirect_status() {
        let response = Response::redirect(http::StatusCode::OK, "/").unwrap();
        assert_eq!(response.status(), http::StatusCode::FOUND);
    }

    #[test]
    fn attachment_sanitizes_path_traversal_filenames() {
        let response = Response::attachment("../../etc/passwd", None, "data").unwrap();
        let disposition = response
            .header(http::header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(disposition, "attachment; filename=\"....etcpasswd\"");
    }

    #[test]
    fn with_status_zero_maps_to_200() {
        let response = Response::with_status(http::StatusCode::from_u16(0).unwrap_or(http::StatusCode::OK));
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[test]
    fn with_cache_control_negative_sets_no_cache_headers() {
        let response = Response::empty_200().with_cache_control(-1);
        assert_eq!(response.header(http::header::CACHE_CONTROL).unwrap(), "no-cache, no-store, must-revalidate");
    }

    #[test]
    fn with_cache_control_positive_sets_max_age() {
        let response = Response::empty_200().with_cache_control(3600);
        let header = response.header(http::header::CACHE_CONTROL).unwrap().to_str().unwrap();
        assert!(header.contains("max-age=3600"));
    }
}
