//! Trestle is a toolkit for composing HTTP services: a compressed radix-trie
//! router, a generic request dispatcher, and a streaming response layer for
//! chunked bytes, newline-delimited JSON, and Server-Sent Events. Trestle is
//! built on `hyper` and `tokio`.
//!
//! # Getting started
//! ```toml
//! trestle = "0.1.0"
//! tokio = { version = "1.26.0", features = ["full"] }
//! ```
//!
//! # Examples
//! ```rust,no_run
//! async fn hello_world(_: trestle::Request) -> Result<trestle::Response, anyhow::Error> {
//!     Ok(trestle::Response::text("hello, world!"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), anyhow::Error> {
//!     let mut http = trestle::http();
//!     http.get("/", trestle::endpoints::sync(hello_world));
//!     http.listen("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]
#![deny(clippy::correctness, unused_must_use)]

#[macro_use]
extern crate async_trait;

mod context;
mod data;
mod entity;
pub mod endpoints;
mod error;
pub mod method;
pub mod middleware;
mod params;
mod pattern;
mod request;
pub mod response;
mod router;
mod trie;

#[cfg(feature = "cookie")]
pub use cookie::{Cookie, CookieBuilder, CookieJar};

pub use self::context::{Context, DefaultContext};
pub use self::data::{DataStream, DataTransfer};
pub use self::endpoints::Endpoint;
pub use self::entity::HttpEntity;
pub use self::error::{DispatchError, InsertError, PatternError, RenderError, TrestleError};
pub use self::middleware::Middleware;
pub use self::params::Params;
pub use self::request::{RemoteAddress, Request};
pub use self::response::{IntoResponse, Response};
pub use self::router::Router;

pub use ::http;
pub use hyper::Body;

/// A type alias for [`std::result::Result`], defaulted for the common case
/// of a handler that produces a [`Response`].
///
/// # Examples
/// ```rust
/// async fn handle(_req: trestle::Request) -> trestle::Result {
///     Ok(trestle::Response::text("hello, world!"))
/// }
/// ```
pub type Result<R = Response, E = anyhow::Error> = std::result::Result<R, E>;

/// Creates a new, empty HTTP router. Shorthand for [`Router::new`].
#[must_use]
#[inline]
pub fn http() -> Router {
    Router::new()
}
