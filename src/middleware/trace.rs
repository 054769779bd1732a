use std::pin::Pin;
use std::time::Instant;

use crate::{Middleware, Request, Response};

use super::Next;

/// Logs each request as it enters and leaves the chain, at `info` level.
///
/// ```text
/// --> GET /users/42
/// <-- GET /users/42: 200 OK (in 1ms)
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceMiddleware;

#[async_trait::async_trait]
impl Middleware for TraceMiddleware {
    async fn apply(
        self: Pin<&Self>,
        request: Request,
        next: Next<'_>,
    ) -> Result<Response, anyhow::Error> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        log::info!("--> {method} {uri}");

        let start = Instant::now();
        let result = next.apply(request).await;
        let elapsed = start.elapsed();

        log::info!(
            "<-- {method} {uri}: {} (in {}ms)",
            StatusDisplay(&result),
            elapsed.as_millis()
        );

        result
    }
}

struct StatusDisplay<'a>(&'a Result<Response, anyhow::Error>);

impl std::fmt::Display for StatusDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Ok(response) => write!(f, "{}", response.status_hint()),
            Err(e) => write!(f, "error: {e}"),
        }
    }
}
