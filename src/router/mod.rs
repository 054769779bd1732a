//! The dispatcher: composes the routing trie, the middleware chain, and an
//! error handler into something that can answer an HTTP request.

mod service;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::endpoints::{self, Endpoint};
use crate::error::DispatchError;
use crate::method::{self, Mask};
use crate::middleware::{Middleware, Next};
use crate::trie::Node;
use crate::{HttpEntity, Request, Response};

type BoxEndpoint = Pin<Box<dyn Endpoint>>;
type ErrorHandler = Arc<dyn Fn(DispatchError) -> Response + Send + Sync>;

/// A compressed radix-trie router: owns a set of routes, a middleware chain,
/// and an error handler, and turns a [`Request`] into a [`Response`].
///
/// Routes are registered with the per-method helpers ([`Router::get`],
/// [`Router::post`], …), [`Router::handle`] for every method at once, or
/// [`Router::method`] for an explicit set. Sub-routers are attached with
/// [`Router::mount`] or built in place with [`Router::route`].
///
/// # Examples
/// ```rust
/// # use trestle::*;
/// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
/// let mut http = trestle::http();
/// http.get("/", endpoints::sync(|_| Response::text("hello")));
/// let response = http.dispatch(Request::get("/")?).await;
/// assert_eq!(response.status(), http::StatusCode::OK);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    trie: Node<BoxEndpoint>,
    middleware: Vec<Pin<Box<dyn Middleware>>>,
    error_handler: ErrorHandler,
    routed: bool,
    terminate: Option<watch::Receiver<bool>>,
    /// Sub-routers attached with [`Router::mount`], alongside the (trailing-
    /// slash-trimmed) pattern they're mounted at. Kept separately from the
    /// trie so [`Router::routes`] can expand them with their mount prefix --
    /// the trie itself only ever sees the opaque [`MountEndpoint`] stub.
    mounts: Vec<(String, Arc<Router>)>,
}

impl Default for Router {
    fn default() -> Self {
        Router::new()
    }
}

macro_rules! registrar {
    ($($(#[$m:meta])* $name:ident => $bit:path;)+) => {
        $($(#[$m])* pub fn $name<E: Endpoint + 'static>(&mut self, pattern: &str, endpoint: E) -> &mut Self {
            self.method(pattern, endpoint, $bit)
        })+
    };
}

impl Router {
    /// Creates an empty router: no routes, no middleware, the default error
    /// handler.
    #[must_use]
    pub fn new() -> Self {
        Router {
            trie: Node::root(),
            middleware: Vec::new(),
            error_handler: Arc::new(default_error_handler),
            routed: false,
            terminate: None,
            mounts: Vec::new(),
        }
    }

    registrar! {
        /// Registers `endpoint` at `pattern` for `GET` requests.
        get => method::GET;
        /// Registers `endpoint` at `pattern` for `POST` requests.
        post => method::POST;
        /// Registers `endpoint` at `pattern` for `PUT` requests.
        put => method::PUT;
        /// Registers `endpoint` at `pattern` for `PATCH` requests.
        patch => method::PATCH;
        /// Registers `endpoint` at `pattern` for `DELETE` requests.
        delete => method::DELETE;
        /// Registers `endpoint` at `pattern` for `HEAD` requests.
        head => method::HEAD;
        /// Registers `endpoint` at `pattern` for `OPTIONS` requests.
        options => method::OPTIONS;
        /// Registers `endpoint` at `pattern` for `CONNECT` requests.
        connect => method::CONNECT;
        /// Registers `endpoint` at `pattern` for `TRACE` requests.
        trace => method::TRACE;
    }

    /// Registers `endpoint` at `pattern` for every method this crate
    /// recognizes.
    pub fn handle<E: Endpoint + 'static>(&mut self, pattern: &str, endpoint: E) -> &mut Self {
        self.method(pattern, endpoint, method::ALL)
    }

    /// Registers `endpoint` at `pattern` for the methods set in `mask`.
    ///
    /// # Panics
    /// Panics if `pattern` fails to parse, e.g. an unclosed `{`, a `*` that
    /// isn't at the end, or two parameters declaring the same name. These are
    /// programmer errors caught the first time the pattern is ever
    /// registered.
    pub fn method<E: Endpoint + 'static>(&mut self, pattern: &str, endpoint: E, mask: Mask) -> &mut Self {
        self.insert(pattern, mask, Box::pin(endpoint), false);
        self
    }

    fn insert(&mut self, pattern: &str, mask: Mask, endpoint: BoxEndpoint, is_stub: bool) {
        self.routed = true;
        self.trie
            .insert(pattern, mask, Arc::new(endpoint), is_stub)
            .unwrap_or_else(|e| panic!("failed to register route {pattern:?}: {e}"));
    }

    /// Appends router-wide middleware, run on every request regardless of
    /// which route matched.
    ///
    /// # Panics
    /// Panics if any route has already been registered -- router-wide
    /// middleware must be installed before routing begins.
    pub fn use_mw<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        assert!(
            !self.routed,
            "use_mw must be called before any route is registered"
        );
        self.middleware.push(Box::pin(middleware));
        self
    }

    /// Sets the handler invoked for [`DispatchError`]s the dispatcher itself
    /// raises (`NotFound`, `MethodNotAllowed`, `NilResponse`, `Internal`).
    /// The default writes a plain-text body with the matching status code.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(DispatchError) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Begins an inline group: routes registered through the returned
    /// [`Scope`] run `middleware` before anything registered directly on
    /// this router, but routes registered directly are unaffected. The
    /// chain is baked into each handler at registration time, not
    /// re-evaluated per request.
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// let mut http = trestle::http();
    /// http.with(middleware::TraceMiddleware)
    ///     .get("/admin", endpoints::sync(|_| Response::empty_204()));
    /// ```
    pub fn with<M: Middleware + 'static>(&mut self, middleware: M) -> Scope<'_> {
        Scope {
            router: self,
            middleware: ScopeMiddleware::Building(vec![Box::pin(middleware)]),
        }
    }

    /// Shorthand for [`Router::with`] followed immediately by `build`,
    /// useful when a group registers more than one route.
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// let mut http = trestle::http();
    /// http.group(middleware::TraceMiddleware, |admin| {
    ///     admin.get("/admin/users", endpoints::sync(|_| Response::empty_204()));
    ///     admin.get("/admin/settings", endpoints::sync(|_| Response::empty_204()));
    /// });
    /// ```
    pub fn group<M, F>(&mut self, middleware: M, build: F) -> &mut Self
    where
        M: Middleware + 'static,
        F: FnOnce(&mut Scope<'_>),
    {
        build(&mut self.with(middleware));
        self
    }

    /// Builds a sub-router by running `build` against a fresh [`Router`],
    /// then mounts it at `pattern`. Shorthand for constructing the
    /// sub-router by hand and calling [`Router::mount`].
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// let mut http = trestle::http();
    /// http.route("/users", |users| {
    ///     users.get("/", endpoints::sync(|_| Response::text("index")));
    ///     users.get("/{id}", endpoints::context(|ctx: DefaultContext| async move {
    ///         Response::text(format!("user {}", ctx.param("id")))
    ///     }));
    /// });
    /// ```
    pub fn route<F>(&mut self, pattern: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        let mut sub = Router::new();
        build(&mut sub);
        self.mount(pattern, sub)
    }

    /// Attaches an already-built sub-router at `pattern`. The pattern is
    /// normalized to end with `/`, and registered under three forms
    /// (`pattern`, `pattern/`, `pattern/*`) so that both the bare prefix and
    /// anything beneath it reach the sub-router; requests are rewritten to
    /// be relative to the sub-router's own root before it dispatches them.
    ///
    /// # Examples
    /// ```rust
    /// # use trestle::*;
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let mut api = Router::new();
    /// api.get("/ping", endpoints::sync(|_| Response::text("pong")));
    ///
    /// let mut http = Router::new();
    /// http.mount("/api", api);
    ///
    /// let response = http.dispatch(Request::get("/api/ping")?).await;
    /// assert_eq!(response.status(), http::StatusCode::OK);
    /// # Ok(())
    /// # }
    /// ```
    pub fn mount(&mut self, pattern: &str, sub: Router) -> &mut Self {
        let base = pattern.trim_end_matches('/');
        let mounted = Arc::new(sub);

        let bare = if base.is_empty() { "/".to_owned() } else { base.to_owned() };
        let with_slash = format!("{base}/");
        let catch_all = format!("{base}/*");

        for path in [bare.as_str(), with_slash.as_str(), catch_all.as_str()] {
            let endpoint = MountEndpoint { sub: Arc::clone(&mounted) };
            self.insert(path, method::STUB | method::ALL, Box::pin(endpoint), true);
        }
        self.mounts.push((base.to_owned(), mounted));
        self
    }

    /// Lists every concrete route installed, as `(mask, pattern)` pairs.
    /// Mount points themselves aren't listed, but the routes mounted beneath
    /// them are, with the mount's prefix already applied.
    #[must_use]
    pub fn routes(&self) -> Vec<(Mask, String)> {
        let mut out = Vec::new();
        self.trie.walk("", &mut |pattern, mask| out.push((mask, pattern.to_owned())));
        for (base, sub) in &self.mounts {
            for (mask, pattern) in sub.routes() {
                out.push((mask, format!("{base}{pattern}")));
            }
        }
        out
    }

    /// A channel that, when sent `true`, tells [`Router::listen`] to stop
    /// accepting new connections and shut down gracefully once in-flight
    /// requests finish. Dropping the sender has no effect; only sending
    /// `true` does.
    pub fn termination_signal(&mut self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        self.terminate = Some(rx);
        tx
    }

    /// Dispatches a single request, producing a response. Request-routing
    /// failures (no matching route, wrong method, a handler that produced
    /// nothing, an unhandled error) are folded into a response by the error
    /// handler rather than propagated -- a [`Router`] always succeeds in
    /// producing *a* response.
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let path = request.uri().path();
        let search = if path.is_empty() { "/" } else { path }.to_owned();

        let method_bit = match method::bit_for(request.method()) {
            Some(bit) => bit,
            None => return (self.error_handler)(DispatchError::MethodNotAllowed {
                allow: self.allowed_methods(&search),
            }),
        };

        match self.trie.find(&search, method_bit) {
            Ok(found) => {
                let endpoint = Arc::clone(found.handler);
                request.extensions_mut().insert(found.params);
                self.run(&endpoint, request).await
            }
            Err(true) => (self.error_handler)(DispatchError::MethodNotAllowed {
                allow: self.allowed_methods(&search),
            }),
            Err(false) => (self.error_handler)(DispatchError::NotFound),
        }
    }

    async fn run(&self, endpoint: &Arc<BoxEndpoint>, request: Request) -> Response {
        let next = Next::new(&self.middleware[..], endpoint.as_ref().as_ref());
        match next.apply(request).await {
            Ok(response) => response,
            Err(error) => (self.error_handler)(DispatchError::Internal(error)),
        }
    }

    fn allowed_methods(&self, search: &str) -> Vec<http::Method> {
        self.trie
            .allowed_methods(search)
            .into_iter()
            .filter_map(method::method_for)
            .collect()
    }
}

fn default_error_handler(error: DispatchError) -> Response {
    match error {
        DispatchError::NotFound => {
            let mut response = Response::text("not found");
            *response.status_mut() = http::StatusCode::NOT_FOUND;
            response
        }
        DispatchError::MethodNotAllowed { allow } => {
            let mut response = Response::text("method not allowed");
            *response.status_mut() = http::StatusCode::METHOD_NOT_ALLOWED;
            let value = allow.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
            if let Ok(value) = http::HeaderValue::from_str(&value) {
                response.headers_mut().insert(http::header::ALLOW, value);
            }
            response
        }
        DispatchError::NilResponse => {
            log::error!("handler produced no response");
            let mut response = Response::text("internal server error");
            *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
        DispatchError::Internal(error) => {
            log::error!("unhandled error while dispatching: {error:#}");
            let mut response = Response::text("internal server error");
            *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// An inline middleware group, returned by [`Router::with`]. Routes
/// registered through a [`Scope`] run the group's middleware before
/// anything registered directly on the underlying router.
pub struct Scope<'r> {
    router: &'r mut Router,
    middleware: ScopeMiddleware,
}

/// A [`Scope`]'s middleware list, built up through [`Scope::with`] until the
/// first route is registered, at which point it's sealed behind an `Arc` so
/// every route the group goes on to register shares the same middleware
/// instances rather than each getting its own copy.
enum ScopeMiddleware {
    Building(Vec<Pin<Box<dyn Middleware>>>),
    Sealed(Arc<[Pin<Box<dyn Middleware>>]>),
}

impl ScopeMiddleware {
    fn seal(&mut self) -> Arc<[Pin<Box<dyn Middleware>>]> {
        if let ScopeMiddleware::Building(v) = self {
            *self = ScopeMiddleware::Sealed(std::mem::take(v).into());
        }
        match self {
            ScopeMiddleware::Sealed(arc) => Arc::clone(arc),
            ScopeMiddleware::Building(_) => unreachable!(),
        }
    }
}

impl Scope<'_> {
    registrar! {
        /// Registers `endpoint` at `pattern` for `GET` requests, behind this
        /// group's middleware.
        get => method::GET;
        /// Registers `endpoint` at `pattern` for `POST` requests, behind this
        /// group's middleware.
        post => method::POST;
        /// Registers `endpoint` at `pattern` for `PUT` requests, behind this
        /// group's middleware.
        put => method::PUT;
        /// Registers `endpoint` at `pattern` for `PATCH` requests, behind this
        /// group's middleware.
        patch => method::PATCH;
        /// Registers `endpoint` at `pattern` for `DELETE` requests, behind
        /// this group's middleware.
        delete => method::DELETE;
        /// Registers `endpoint` at `pattern` for `HEAD` requests, behind this
        /// group's middleware.
        head => method::HEAD;
        /// Registers `endpoint` at `pattern` for `OPTIONS` requests, behind
        /// this group's middleware.
        options => method::OPTIONS;
        /// Registers `endpoint` at `pattern` for `CONNECT` requests, behind
        /// this group's middleware.
        connect => method::CONNECT;
        /// Registers `endpoint` at `pattern` for `TRACE` requests, behind
        /// this group's middleware.
        trace => method::TRACE;
    }

    /// Registers `endpoint` at `pattern` for every method, behind this
    /// group's middleware.
    pub fn handle<E: Endpoint + 'static>(&mut self, pattern: &str, endpoint: E) -> &mut Self {
        self.method(pattern, endpoint, method::ALL)
    }

    /// Registers `endpoint` at `pattern` for the methods set in `mask`,
    /// wrapping it with this group's middleware before installing it in the
    /// shared trie.
    pub fn method<E: Endpoint + 'static>(&mut self, pattern: &str, endpoint: E, mask: Mask) -> &mut Self {
        let chained: BoxEndpoint = Box::pin(ChainEndpoint {
            middleware: self.middleware.seal(),
            endpoint: Box::pin(endpoint),
        });
        self.router.insert(pattern, mask, chained, false);
        self
    }

    /// Nests a further middleware layer inside this group.
    ///
    /// # Panics
    /// Panics if a route has already been registered through this group --
    /// nested middleware must be added before the group starts handing out
    /// routes.
    pub fn with<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        match &mut self.middleware {
            ScopeMiddleware::Building(v) => v.push(Box::pin(middleware)),
            ScopeMiddleware::Sealed(_) => {
                panic!("Scope::with must be called before any route is registered through this group")
            }
        }
        self
    }
}

struct ChainEndpoint {
    middleware: Arc<[Pin<Box<dyn Middleware>>]>,
    endpoint: BoxEndpoint,
}

#[async_trait::async_trait]
impl Endpoint for ChainEndpoint {
    async fn apply(&self, request: Request) -> Result<Response, anyhow::Error> {
        let next = Next::new(&self.middleware[..], self.endpoint.as_ref());
        next.apply(request).await
    }
}

struct MountEndpoint {
    sub: Arc<Router>,
}

#[async_trait::async_trait]
impl Endpoint for MountEndpoint {
    async fn apply(&self, mut request: Request) -> Result<Response, anyhow::Error> {
        let params = endpoints::take_params(&mut request);
        let captured = params.get("*");
        let path = if captured.is_empty() {
            "/".to_owned()
        } else {
            format!("/{captured}")
        };
        request.set_path(&path)?;
        Ok(self.sub.dispatch(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints;

    fn ok() -> impl Endpoint {
        endpoints::sync(|_| Response::empty_204())
    }

    #[tokio::test]
    async fn dispatch_matches_registered_route() {
        let mut router = Router::new();
        router.get("/users/{id}", ok());
        let response = router.dispatch(Request::get("/users/42").unwrap()).await;
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn dispatch_reports_404_for_unknown_path() {
        let router = Router::new();
        let response = router.dispatch(Request::get("/nope").unwrap()).await;
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_reports_405_with_allow_header() {
        let mut router = Router::new();
        router.get("/users", ok());
        let response = router.dispatch(Request::post("/users").unwrap()).await;
        assert_eq!(response.status(), http::StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header(http::header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn mount_rewrites_the_path_before_delegating() {
        let mut sub = Router::new();
        sub.get("/ping", endpoints::sync(|r: Request| Response::text(r.uri().path().to_owned())));

        let mut router = Router::new();
        router.mount("/api", sub);

        let response = router.dispatch(Request::get("/api/ping").unwrap()).await;
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[test]
    fn routes_reports_mounted_sub_routes_with_the_mount_prefix() {
        let mut sub = Router::new();
        sub.get("/ping", ok());
        sub.post("/pong", ok());

        let mut router = Router::new();
        router.get("/status", ok());
        router.mount("/api", sub);

        let routes = router.routes();
        assert!(routes.iter().any(|(_, pattern)| pattern == "/status"));
        assert!(routes.iter().any(|(_, pattern)| pattern == "/api/ping"));
        assert!(routes.iter().any(|(_, pattern)| pattern == "/api/pong"));
        assert!(!routes.iter().any(|(_, pattern)| pattern.contains("/api/*")));
    }

    #[tokio::test]
    async fn group_applies_middleware_only_to_its_own_routes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Debug)]
        struct Counter(Arc<AtomicUsize>);

        #[async_trait::async_trait]
        impl Middleware for Counter {
            async fn apply(
                self: Pin<&Self>,
                request: Request,
                next: Next<'_>,
            ) -> Result<Response, anyhow::Error> {
                self.0.fetch_add(1, Ordering::SeqCst);
                next.apply(request).await
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.get("/outside", ok());
        router
            .with(Counter(Arc::clone(&count)))
            .get("/inside", ok());

        router.dispatch(Request::get("/outside").unwrap()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        router.dispatch(Request::get("/inside").unwrap()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "use_mw must be called before any route is registered")]
    fn use_mw_after_a_route_panics() {
        let mut router = Router::new();
        router.get("/", ok());
        router.use_mw(crate::middleware::TraceMiddleware);
    }
}
