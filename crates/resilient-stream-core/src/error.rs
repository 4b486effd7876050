//! Error taxonomy for stream connections.
//!
//! Nothing in the public send/destroy surface returns these errors. They are
//! funneled through the controller's single error path and delivered to
//! whoever subscribed to the `error` event.

use std::sync::Arc;
use thiserror::Error;

/// Boxed error type used at the proxy and factory boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reference-counted error, for errors that are observed by several listeners.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An error observed while managing a stream proxy.
///
/// # Examples
///
/// ```
/// use resilient_stream_core::{ErrorKind, StreamError};
///
/// let err = StreamError::Send("pipe closed".into());
/// assert!(err.is_send());
/// assert_eq!(err.kind(), ErrorKind::Send);
/// assert_eq!(err.to_string(), "proxy rejected item: pipe closed");
/// ```
#[derive(Debug, Error)]
pub enum StreamError {
    /// The factory failed while building a replacement proxy.
    #[error("failed to construct stream proxy: {0}")]
    Construction(#[source] BoxError),

    /// The current proxy rejected an outbound item.
    #[error("proxy rejected item: {0}")]
    Send(#[source] BoxError),

    /// The proxy's own teardown failed.
    #[error("failed to destroy stream proxy: {0}")]
    Destroy(#[source] BoxError),

    /// A live proxy reported an error on its error channel.
    #[error("stream proxy error: {0}")]
    Proxy(#[source] SharedError),

    /// Consecutive construction failures reached the configured bound.
    #[error("gave up after {attempts} consecutive failed construction attempts")]
    AttemptsExhausted {
        /// The number of failed attempts in the round.
        attempts: u32,
    },
}

/// Discriminant of a [`StreamError`], handy for metrics labels and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`StreamError::Construction`].
    Construction,
    /// See [`StreamError::Send`].
    Send,
    /// See [`StreamError::Destroy`].
    Destroy,
    /// See [`StreamError::Proxy`].
    Proxy,
    /// See [`StreamError::AttemptsExhausted`].
    AttemptsExhausted,
}

impl ErrorKind {
    /// Returns a stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Construction => "construction",
            ErrorKind::Send => "send",
            ErrorKind::Destroy => "destroy",
            ErrorKind::Proxy => "proxy",
            ErrorKind::AttemptsExhausted => "attempts_exhausted",
        }
    }
}

impl StreamError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Construction(_) => ErrorKind::Construction,
            StreamError::Send(_) => ErrorKind::Send,
            StreamError::Destroy(_) => ErrorKind::Destroy,
            StreamError::Proxy(_) => ErrorKind::Proxy,
            StreamError::AttemptsExhausted { .. } => ErrorKind::AttemptsExhausted,
        }
    }

    /// Returns `true` if the factory failed.
    pub fn is_construction(&self) -> bool {
        matches!(self, StreamError::Construction(_))
    }

    /// Returns `true` if the proxy rejected an item.
    pub fn is_send(&self) -> bool {
        matches!(self, StreamError::Send(_))
    }

    /// Returns `true` if proxy teardown failed.
    pub fn is_destroy(&self) -> bool {
        matches!(self, StreamError::Destroy(_))
    }

    /// Returns `true` if a live proxy emitted the error.
    pub fn is_proxy(&self) -> bool {
        matches!(self, StreamError::Proxy(_))
    }

    /// Returns the underlying proxy or factory error, if any.
    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            StreamError::Construction(e) | StreamError::Send(e) | StreamError::Destroy(e) => {
                Some(e.as_ref())
            }
            StreamError::Proxy(e) => Some(e.as_ref()),
            StreamError::AttemptsExhausted { .. } => None,
        }
    }
}
