//! The error hierarchy, split along the three failure classes the design
//! distinguishes: registration (programmer) errors, per-request routing
//! errors, and mid-render errors.

use std::fmt;

/// Raised while parsing a route pattern. These are programmer errors: they
/// never occur against a pattern that has already been exercised once, and
/// they are always raised synchronously at registration time.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PatternError {
    #[error("pattern {0:?} does not begin with '/'")]
    InvalidPattern(String),
    #[error("pattern {0:?} has an unclosed '{{'")]
    UnclosedParam(String),
    #[error("pattern {0:?} uses '*' before the end of the pattern")]
    WildcardPosition(String),
    #[error("pattern {0:?} declares the parameter {1:?} more than once")]
    DuplicateParam(String, String),
    #[error("regular expression {0:?} in pattern {1:?} failed to compile: {2}")]
    InvalidRegex(String, String, #[source] regex::Error),
}

/// Raised while inserting a route into the trie; a superset of
/// [`PatternError`] covering failures specific to the trie itself.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum InsertError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("{0:?} is not a recognized HTTP method")]
    InvalidMethod(String),
    #[error("attempted to mount a nil sub-router at {0:?}")]
    NilSubRouter(String),
    #[error("internal error: a trie child vanished mid-insert")]
    MissingChild,
}

/// The small, closed set of failures the dispatcher itself raises. Anything
/// else -- a handler's own error, a recovered panic -- is folded into
/// [`DispatchError::Internal`] before reaching the error handler.
#[derive(Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// No leaf in the trie matched the request path.
    NotFound,
    /// A leaf matched the path, but not the request method. Carries the
    /// methods that *are* installed there, for the `Allow` header.
    MethodNotAllowed { allow: Vec<http::Method> },
    /// A handler returned successfully but produced no response.
    NilResponse,
    /// Anything else: a handler error, or a recovered panic.
    Internal(anyhow::Error),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotFound => write!(f, "no route matched the request"),
            DispatchError::MethodNotAllowed { allow } => {
                write!(f, "method not allowed, allowed: ")?;
                for (i, m) in allow.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
            DispatchError::NilResponse => write!(f, "handler produced no response"),
            DispatchError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Raised while a response producer is writing its body. If no bytes have
/// reached the wire yet the dispatcher folds this into the error handler;
/// otherwise it is only logged, since the status line is already sent.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum RenderError {
    #[error("failed to build the response head: {0}")]
    Build(#[from] http::Error),
    #[cfg(feature = "json")]
    #[error("failed to encode the response body as json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("failed to write the response body: {0}")]
    Io(#[from] std::io::Error),
    #[error("the response writer does not support flushing, required for streaming responses")]
    NotFlushable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by the ambient request/response helpers: reading a body,
/// binding a listener, converting an entity's content.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TrestleError {
    #[error("could not parse {0:?} as a listen address")]
    InvalidAddress(String),
    #[error(transparent)]
    HyperServer(#[from] hyper::Error),
    #[error("could not read the body of a request or response")]
    ReadBody(#[source] std::io::Error),
    #[cfg(feature = "json")]
    #[error("could not deserialize the body as json")]
    JsonDeserialization(#[source] serde_json::Error),
    #[error("could not deserialize the body as utf-8 text")]
    TextDeserialization(#[source] std::string::FromUtf8Error),
    #[error("the content-type of the request was missing or unsupported")]
    UnsupportedMediaType(Option<mime::Mime>),
    #[error("the request body was too long, and was cut off")]
    PayloadTooLarge(#[source] anyhow::Error),
}
