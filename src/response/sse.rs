//! Server-sent events.
//!
//! Event framing (`event:`/`id:`/`data:` lines) is delegated to `async-sse`,
//! the same crate the donor wires up for its own `sse` feature. We only own
//! the transport: priming/keep-alive comment lines, which aren't part of
//! `async-sse`'s event model, are written directly to the body.

use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use super::Response;
use crate::entity::HttpEntity;

/// An event to emit over an SSE stream, built with [`SseSink::send`] or sent
/// directly as a plain string for an unnamed, id-less `data:` event.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    /// The `event:` field, if any.
    pub name: Option<String>,
    /// The `id:` field, if any.
    pub id: Option<String>,
    /// The `data:` payload. Split across multiple `data:` lines if it
    /// contains newlines, per the SSE wire format.
    pub data: String,
}

impl From<String> for SseEvent {
    fn from(data: String) -> Self {
        SseEvent {
            data,
            ..Default::default()
        }
    }
}

impl From<&str> for SseEvent {
    fn from(data: &str) -> Self {
        SseEvent::from(data.to_owned())
    }
}

/// Tuning knobs for [`Response::sse`].
#[derive(Debug, Clone, Copy)]
pub struct SseOptions {
    /// How often to emit a `: keepalive` comment line while the source is
    /// otherwise idle. `None` disables keep-alives.
    pub keep_alive: Option<Duration>,
    /// Sets the `Retry` header (milliseconds), hinting how long a client
    /// should wait before reconnecting. `None` omits the header.
    pub retry: Option<u64>,
}

impl Default for SseOptions {
    fn default() -> Self {
        SseOptions {
            keep_alive: Some(Duration::from_secs(30)),
            retry: None,
        }
    }
}

/// A handle to push events into an SSE response body started with
/// [`Response::sse_sink`].
pub struct SseSink {
    events: async_sse::Sender,
    encoder: Compat<async_sse::Encoder>,
    body: hyper::body::Sender,
}

impl SseSink {
    /// Sends one event.
    pub async fn send(&mut self, event: impl Into<SseEvent>) -> Result<(), anyhow::Error> {
        let event = event.into();
        self.events
            .send(event.name.as_deref(), &event.data, event.id.as_deref())
            .await?;
        self.drain().await
    }

    /// Resolves once the client has disconnected.
    pub async fn closed(&mut self) {
        self.body.closed().await
    }

    async fn comment(&mut self, text: &'static str) -> Result<(), anyhow::Error> {
        self.body.send_data(Bytes::from_static(text.as_bytes())).await?;
        Ok(())
    }

    /// Forwards whatever `async-sse` has already encoded and buffered for
    /// the event just sent. `now_or_never` is safe here: the encoder only
    /// ever has bytes ready immediately after a `send`, never asynchronously
    /// later, so a pending poll means "nothing more to forward right now".
    async fn drain(&mut self) -> Result<(), anyhow::Error> {
        let mut buf = [0u8; 4096];
        loop {
            match self.encoder.read(&mut buf).now_or_never() {
                Some(Ok(0)) | None => break,
                Some(Ok(n)) => {
                    self.body.send_data(Bytes::copy_from_slice(&buf[..n])).await?;
                }
                Some(Err(error)) => return Err(error.into()),
            }
        }
        Ok(())
    }
}

impl Response {
    /// Starts an SSE response, returning it alongside a handle the caller
    /// drives independently.
    pub fn sse_sink(options: SseOptions) -> (Self, SseSink) {
        let (events, encoder) = async_sse::encode();
        let encoder = encoder.compat();
        let (body, hyper_body) = hyper::Body::channel();
        let mut response = Response::new(http::StatusCode::OK, hyper_body);
        response.set_default_content_type("text/event-stream");
        response.set_header(http::header::CACHE_CONTROL, "no-cache").ok();
        response.set_header(http::header::CONNECTION, "keep-alive").ok();
        response.set_header("X-Accel-Buffering", "no").ok();
        if let Some(retry) = options.retry {
            response.set_header("Retry", retry.to_string()).ok();
        }
        (response, SseSink { events, encoder, body })
    }

    /// Streams `source` as SSE events, emitting periodic keep-alive comments
    /// per `options` while the source is idle, and stopping as soon as the
    /// client disconnects.
    pub fn sse<S, E>(source: S, options: SseOptions) -> Self
    where
        S: futures::Stream<Item = E> + Send + 'static,
        E: Into<SseEvent> + Send + 'static,
    {
        let (response, sink) = Response::sse_sink(options);
        tokio::spawn(drive_sse(sink, source, options));
        response
    }
}

async fn drive_sse<S, E>(mut sink: SseSink, source: S, options: SseOptions)
where
    S: futures::Stream<Item = E> + Send + 'static,
    E: Into<SseEvent> + Send + 'static,
{
    futures::pin_mut!(source);

    if sink.comment(": connected\n\n").await.is_err() {
        return;
    }

    loop {
        let next = match options.keep_alive {
            Some(interval) => {
                tokio::select! {
                    item = source.next() => Next::Item(item),
                    _ = tokio::time::sleep(interval) => Next::KeepAlive,
                    _ = sink.closed() => Next::Closed,
                }
            }
            None => tokio::select! {
                item = source.next() => Next::Item(item),
                _ = sink.closed() => Next::Closed,
            },
        };

        match next {
            Next::Item(Some(event)) => {
                if sink.send(event.into()).await.is_err() {
                    break;
                }
            }
            Next::Item(None) => break,
            Next::KeepAlive => {
                if sink.comment(": keepalive\n\n").await.is_err() {
                    break;
                }
            }
            Next::Closed => break,
        }
    }
}

enum Next<T> {
    Item(Option<T>),
    KeepAlive,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sse_sink_primes_with_a_connected_comment_before_any_event() {
        let (mut response, mut sink) = Response::sse_sink(SseOptions::default());
        tokio::spawn(async move {
            sink.comment(": connected\n\n").await.ok();
            sink.send("hello").await.ok();
        });

        let body = response.data(1_000).into_bytes().await.unwrap();
        assert!(body.starts_with(b": connected\n\n"));
    }

    #[test]
    fn sse_sink_sets_required_headers() {
        let (response, _sink) = Response::sse_sink(SseOptions {
            retry: Some(2_000),
            ..SseOptions::default()
        });
        assert_eq!(response.header(http::header::CONTENT_TYPE).unwrap(), "text/event-stream");
        assert_eq!(response.header(http::header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(response.header(http::header::CONNECTION).unwrap(), "keep-alive");
        assert_eq!(response.header("X-Accel-Buffering").unwrap(), "no");
        assert_eq!(response.header("Retry").unwrap(), "2000");
    }
}
