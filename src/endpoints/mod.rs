//! Endpoints: the leaves a [`crate::Router`] dispatches to.
//!
//! An [`Endpoint`] is deliberately not generic over any particular request
//! context type -- a [`crate::Router`] is free to mix context-aware handlers
//! ([`context`]) with plain request-in/response-out ones ([`sync`],
//! [`simple`]) side by side, since both ultimately just consume a
//! [`Request`] and produce a [`Response`].

mod dir;

use std::future::Future;
use std::marker::PhantomData;

use crate::context::Context;
use crate::params::Params;
use crate::response::IntoResponse;
use crate::{Request, Response};

/// Something a [`crate::Router`] can dispatch a matched request to.
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync {
    /// Handles `request`, producing a response or a terminal failure.
    async fn apply(&self, request: Request) -> Result<Response, anyhow::Error>;
}

/// Pulls the parameters the trie captured for this request out of its
/// extensions, where [`crate::Router`] stashed them before entering the
/// middleware chain.
pub(crate) fn take_params(request: &mut Request) -> Params {
    request.extensions_mut().remove::<Params>().unwrap_or_default()
}

struct ContextEndpoint<Ctx, F> {
    handler: F,
    _context: PhantomData<fn() -> Ctx>,
}

#[async_trait::async_trait]
impl<Ctx, F, Fut, R> Endpoint for ContextEndpoint<Ctx, F>
where
    Ctx: Context,
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoResponse + Send,
{
    async fn apply(&self, mut request: Request) -> Result<Response, anyhow::Error> {
        let params = take_params(&mut request);
        let context = Ctx::new(request, params);
        (self.handler)(context).await.into_response()
    }
}

/// Creates an endpoint from an `async fn(Ctx) -> impl IntoResponse`,
/// the primary way a [`crate::Router`] registers a route's handler.
///
/// # Examples
/// ```rust
/// # use trestle::*;
/// async fn show(ctx: DefaultContext) -> Response {
///     Response::text(format!("user {}", ctx.param("id")))
/// }
/// let mut router = Router::new();
/// router.get("/users/{id}", endpoints::context(show));
/// ```
pub fn context<Ctx, F, Fut, R>(handler: F) -> impl Endpoint
where
    Ctx: Context,
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send,
    R: IntoResponse + Send,
{
    ContextEndpoint {
        handler,
        _context: PhantomData,
    }
}

struct SyncEndpoint<F>(F);

#[async_trait::async_trait]
impl<F, Res> Endpoint for SyncEndpoint<F>
where
    F: Fn(Request) -> Res + Send + Sync + 'static,
    Res: IntoResponse + Send + 'static,
{
    async fn apply(&self, request: Request) -> Result<Response, anyhow::Error> {
        (self.0)(request).into_response()
    }
}

/// Creates an endpoint that synchronously generates a response directly
/// from the request, without going through a context. Useful for trivial
/// handlers that don't need captured parameters or application state.
///
/// # Examples
/// ```rust
/// # use trestle::*;
/// let mut router = Router::new();
/// router.get("/ping", endpoints::sync(|_| Response::text("pong")));
/// ```
pub fn sync<F, Res>(func: F) -> impl Endpoint
where
    F: Fn(Request) -> Res + Send + Sync + 'static,
    Res: IntoResponse + Send + 'static,
{
    SyncEndpoint(func)
}

/// Creates an endpoint that always produces the same response, ignoring
/// the request entirely. Best paired with something like
/// [`crate::Response::empty_404`].
pub fn simple<F, Res>(func: F) -> impl Endpoint
where
    F: Fn() -> Res + Send + Sync + 'static,
    Res: IntoResponse + Send + 'static,
{
    sync(move |_| func())
}

/// Creates an endpoint that serves files out of `path`.
///
/// Mount it behind a pattern ending in a catch-all, e.g.
/// `/public/*` -- the endpoint reads the captured `*` parameter to find the
/// file relative to `path`. Rejects any captured segment of `..` or
/// containing a backslash; serves `index.html` for a directory request
/// that ends in `/`, and permanently redirects a directory request that
/// doesn't.
///
/// # Examples
/// ```rust
/// # use trestle::*;
/// let mut router = Router::new();
/// router.get("/public/*", endpoints::dir("public/"));
/// ```
pub fn dir<P>(path: P) -> impl Endpoint
where
    P: Into<std::path::PathBuf>,
{
    self::dir::DirEndpoint::new(path)
}
