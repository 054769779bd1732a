//! Middleware: transformers from one handler into another.
//!
//! A [`Middleware`] wraps the rest of the chain (including the endpoint at
//! the very end) behind [`Next`]. Composition is right-to-left so that the
//! first middleware registered is the first to run on entry, and the last to
//! run on exit.

use std::pin::Pin;

use crate::endpoints::Endpoint;
use crate::{Request, Response};

#[cfg(feature = "cookie")]
mod cookies;
mod state;
mod trace;

#[cfg(feature = "cookie")]
pub use self::cookies::{CookieExt, CookieMiddleware};
pub use self::state::{State, StateMiddleware};
pub use self::trace::TraceMiddleware;

/// The peer address of a connection, set by [`crate::Router::listen`] before
/// a request ever reaches the dispatcher.
#[derive(Debug, Copy, Clone)]
pub(crate) struct PeerAddress(pub std::net::SocketAddr);

/// A transformer from a request into a response, given the rest of the
/// chain.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync + std::fmt::Debug {
    /// Runs this middleware, given the request and the rest of the chain.
    /// Implementations decide whether, when, and how many times to call
    /// `next.apply(request)`.
    async fn apply(
        self: Pin<&Self>,
        request: Request,
        next: Next<'_>,
    ) -> Result<Response, anyhow::Error>;
}

/// The remainder of a middleware chain: zero or more middleware still to
/// run, followed by the endpoint itself.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Pin<Box<dyn Middleware>>],
    endpoint: Pin<&'a dyn Endpoint>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a [Pin<Box<dyn Middleware>>], endpoint: Pin<&'a dyn Endpoint>) -> Self {
        Next { middleware, endpoint }
    }

    /// Runs the next middleware in the chain, or the endpoint if the chain
    /// is exhausted.
    pub async fn apply(self, request: Request) -> Result<Response, anyhow::Error> {
        match self.middleware.split_first() {
            Some((first, rest)) => {
                let next = Next::new(rest, self.endpoint);
                first.as_ref().apply(request, next).await
            }
            None => self.endpoint.apply(request).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.middleware.len())
            .finish()
    }
}
