//! Core infrastructure for resilient-stream.
//!
//! This crate provides the pieces shared by the connection controller and the
//! buffering session:
//! - A named-channel event broker
//! - The stream proxy capability and its two event-source shapes
//! - The error taxonomy reported on the `error` event

pub mod error;
pub mod events;
pub mod proxy;

pub use error::{BoxError, ErrorKind, SharedError, StreamError};
pub use events::{BoxedEventListener, EventBroker, EventListener, FnListener};
pub use proxy::{
    BoxProxy, ProxyBroker, ProxyCallbacks, ProxyEvent, ProxyEventKind, ProxyEvents, StreamProxy,
};
