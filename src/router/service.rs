use super::Router;
use crate::error::TrestleError;
use crate::middleware::PeerAddress;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

impl Router {
    /// Binds `address` and serves this router until its
    /// [`Router::termination_signal`] (if any) fires.
    ///
    /// # Errors
    /// Fails if `address` doesn't parse as a socket address, or if `hyper`
    /// fails to bind or serve it.
    ///
    /// # Examples
    /// ```rust,no_run
    /// # use trestle::*;
    /// # #[tokio::main] async fn main() -> Result<(), anyhow::Error> {
    /// let mut http = trestle::http();
    /// http.get("/", endpoints::sync(|_| Response::text("hello, world!")));
    /// http.listen("0.0.0.0:8080").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn listen(mut self, address: &str) -> Result<(), TrestleError> {
        let address: SocketAddr = address
            .parse()
            .map_err(|_| TrestleError::InvalidAddress(address.to_owned()))?;

        log::info!("listen({})", address);

        if log::log_enabled!(log::Level::Trace) {
            for (mask, pattern) in self.routes() {
                log::trace!("route: {pattern} ({mask:#x})");
            }
        }

        let termination = self.terminate.take();
        let termination = async {
            match termination {
                Some(mut rx) => loop {
                    if *rx.borrow() {
                        break;
                    }
                    match rx.changed().await {
                        Ok(_) => continue,
                        Err(_) => futures::future::pending().await,
                    }
                },
                None => futures::future::pending().await,
            }
        };

        let this = Arc::new(self);

        hyper::server::Server::bind(&address)
            .serve(hyper::service::make_service_fn(
                |v: &hyper::server::conn::AddrStream| {
                    let router = Arc::clone(&this);
                    let service = RouterService(router, v.remote_addr());
                    async move { Ok::<_, std::convert::Infallible>(service) }
                },
            ))
            .with_graceful_shutdown(termination)
            .await
            .map_err(TrestleError::HyperServer)?;

        Ok(())
    }
}

#[derive(Clone)]
struct RouterService(Arc<Router>, SocketAddr);

type RouterFuture<R> = Pin<Box<dyn Future<Output = Result<R, std::convert::Infallible>> + Send + 'static>>;

impl tower::Service<hyper::Request<hyper::Body>> for RouterService {
    type Response = hyper::Response<hyper::Body>;
    type Error = std::convert::Infallible;
    type Future = RouterFuture<Self::Response>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: hyper::Request<hyper::Body>) -> Self::Future {
        let router = Arc::clone(&self.0);
        request.extensions_mut().insert(PeerAddress(self.1));
        Box::pin(async move {
            let response = router.dispatch(request.into()).await;
            Ok(response.into())
        })
    }
}
