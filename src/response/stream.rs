//! Byte-stream and newline-delimited-JSON response bodies.
//!
//! Both are built on `hyper::Body::channel()`: a background task owns the
//! sender and pushes chunks into it, and watches `Sender::closed()` so it
//! stops producing as soon as hyper notices the client went away. This is
//! the same mechanism `hyper`'s own docs recommend for bodies that are
//! produced by something other than polling a `Stream` directly.

use futures::StreamExt;

use super::Response;
use crate::entity::HttpEntity;

/// A handle to push chunks into a streaming response body started with
/// [`Response::stream`].
pub struct StreamSink {
    sender: hyper::body::Sender,
}

impl StreamSink {
    /// Sends a chunk of bytes. Fails if the client has disconnected.
    pub async fn send(&mut self, chunk: impl Into<bytes::Bytes>) -> Result<(), hyper::Error> {
        self.sender.send_data(chunk.into()).await
    }

    /// Aborts the response body with the given error, visible to the client
    /// as a truncated response.
    pub fn abort(mut self) {
        self.sender.abort();
    }

    /// Resolves once the client has disconnected, so a producer can stop
    /// generating chunks it no longer needs to send.
    pub async fn closed(&mut self) {
        self.sender.closed().await
    }
}

/// Tuning knobs for [`Response::ndjson`].
#[derive(Debug, Clone, Copy)]
pub struct NdjsonOptions {
    /// `Content-Type` to advertise; defaults to `application/x-ndjson`.
    pub content_type: &'static str,
}

impl Default for NdjsonOptions {
    fn default() -> Self {
        NdjsonOptions {
            content_type: "application/x-ndjson",
        }
    }
}

impl Response {
    /// Starts a chunked byte-stream response, returning the response itself
    /// (ready to be returned from a handler) and a [`StreamSink`] the caller
    /// drives independently -- typically from a spawned task.
    pub fn stream() -> (Self, StreamSink) {
        let (sender, body) = hyper::Body::channel();
        let response = Response::new(http::StatusCode::OK, body);
        (response, StreamSink { sender })
    }

    /// Streams `source` as newline-delimited JSON, one encoded value per
    /// line. The produced items are serialized as they're pulled from the
    /// stream; serialization failures end the stream early rather than
    /// failing the whole response, since headers have already gone out by
    /// the time an item fails to encode.
    #[cfg(feature = "json")]
    pub fn ndjson<S, T>(source: S, options: NdjsonOptions) -> Self
    where
        S: futures::Stream<Item = T> + Send + 'static,
        T: serde::Serialize + Send + 'static,
    {
        let (sender, body) = hyper::Body::channel();
        let mut response = Response::new(http::StatusCode::OK, body);
        response.set_default_content_type_static(options.content_type);
        response.set_header(http::header::CACHE_CONTROL, "no-cache").ok();
        response.set_header(http::header::CONNECTION, "keep-alive").ok();
        response.set_header("X-Content-Type-Options", "nosniff").ok();

        tokio::spawn(drive_ndjson(sender, source));
        response
    }

    fn set_default_content_type_static(&mut self, value: &'static str) {
        self.set_default_content_type(value);
    }
}

#[cfg(feature = "json")]
async fn drive_ndjson<S, T>(mut sender: hyper::body::Sender, source: S)
where
    S: futures::Stream<Item = T> + Send + 'static,
    T: serde::Serialize + Send + 'static,
{
    futures::pin_mut!(source);
    loop {
        let next = tokio::select! {
            item = source.next() => item,
            _ = sender.closed() => break,
        };

        let Some(item) = next else { break };
        let mut line = match serde_json::to_vec(&item) {
            Ok(bytes) => bytes,
            Err(error) => {
                log::warn!("dropping ndjson response: encode failed: {error}");
                break;
            }
        };
        line.push(b'\n');
        if sender.send_data(bytes::Bytes::from(line)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_sends_chunks_through_sink() {
        let (response, mut sink) = Response::stream();
        tokio::spawn(async move {
            sink.send("hello, ").await.unwrap();
            sink.send("world").await.unwrap();
        });

        let mut response = response;
        let body = response.data(1_000).into_bytes().await.unwrap();
        assert_eq!(&body[..], b"hello, world");
    }
}
