//! The generic per-request context a [`crate::Router`] is parameterized
//! over.
//!
//! A context is built once per request, right before a matched handler
//! runs, from the request itself and the parameters the trie captured for
//! it. The dispatcher never looks inside a context beyond this trait's
//! methods, so an application is free to carry arbitrary extra state by
//! wrapping [`DefaultContext`] in its own type.

use crate::params::Params;
use crate::Request;

/// The minimum a [`crate::Router`]'s context type must provide.
///
/// A context owns the request for the duration of the handler call, so
/// handlers that need to read the body do so through
/// [`Context::request_mut`].
pub trait Context: Send + 'static {
    /// Builds a context from the request and the parameters captured for
    /// it by the trie, in pattern order.
    fn new(request: Request, params: Params) -> Self;

    /// The request being handled.
    fn request(&self) -> &Request;

    /// A mutable handle to the request, for handlers that need to consume
    /// its body.
    fn request_mut(&mut self) -> &mut Request;

    /// The parameters captured for this request.
    fn params(&self) -> &Params;

    /// Looks up one captured parameter; empty string if it was never
    /// captured.
    fn param(&self, key: &str) -> &str {
        self.params().get(key)
    }

    /// Whether the client has gone away. The default implementation always
    /// reports `false`: generic handler code rarely needs this, since the
    /// streaming response variants (see [`crate::response`]) observe
    /// cancellation directly from the body sender they're writing through.
    /// A context wrapping a transport that can detect disconnects earlier
    /// may override this.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// The context type used when a [`crate::Router`] isn't given one of its
/// own; just the request and its captured parameters.
#[derive(Debug)]
pub struct DefaultContext {
    request: Request,
    params: Params,
}

impl Context for DefaultContext {
    fn new(request: Request, params: Params) -> Self {
        DefaultContext { request, params }
    }

    fn request(&self) -> &Request {
        &self.request
    }

    fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    fn params(&self) -> &Params {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_delegates_to_captured_params() {
        let mut params = Params::new();
        params.push(std::sync::Arc::from("id"), "7".to_owned());
        let context = DefaultContext::new(crate::Request::get("/users/7").unwrap(), params);
        assert_eq!(context.param("id"), "7");
        assert_eq!(context.param("missing"), "");
    }
}
