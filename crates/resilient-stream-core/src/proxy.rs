//! The stream proxy capability.
//!
//! A stream proxy is one interchangeable handle to an underlying, unreliable
//! connection. The controller owns exactly one at a time and replaces it
//! whenever it fails. Proxies surface inbound data and errors in one of two
//! shapes, described by [`ProxyEvents`]:
//!
//! - push-style callbacks, where the proxy holds a [`ProxyCallbacks`] and the
//!   controller installs `on_data`/`on_error` handlers on it;
//! - broker subscription, where the proxy publishes [`ProxyEvent`]s on its
//!   own [`ProxyBroker`] and the controller subscribes to it.
//!
//! The controller only depends on [`StreamProxy`]; which shape a proxy picks
//! is invisible to it.

use crate::error::{BoxError, SharedError};
use crate::events::EventBroker;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A handle to one underlying stream connection.
///
/// `T` is the outbound item type, `R` the inbound item type. Both are opaque
/// to the controller.
pub trait StreamProxy<T, R>: Send + Sync {
    /// Hands an outbound item to the connection.
    ///
    /// A returned error means the connection is unusable; the controller will
    /// report it and replace this proxy.
    fn send(&self, item: T) -> Result<(), BoxError>;

    /// Tears down the connection. Errors are reported but never rethrown.
    fn destroy(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Returns the inbound event source the controller subscribes to.
    ///
    /// Called exactly once per proxy instance, right after construction.
    fn events(&self) -> ProxyEvents<'_, R>;
}

/// Shared pointer to a type-erased stream proxy.
pub type BoxProxy<T, R> = Arc<dyn StreamProxy<T, R>>;

impl<T, R, P> StreamProxy<T, R> for Arc<P>
where
    P: StreamProxy<T, R> + ?Sized,
{
    fn send(&self, item: T) -> Result<(), BoxError> {
        (**self).send(item)
    }

    fn destroy(&self) -> Result<(), BoxError> {
        (**self).destroy()
    }

    fn events(&self) -> ProxyEvents<'_, R> {
        (**self).events()
    }
}

/// Where a proxy publishes its inbound data and errors.
pub enum ProxyEvents<'a, R> {
    /// The proxy invokes handlers installed on a [`ProxyCallbacks`].
    Callbacks(&'a ProxyCallbacks<R>),
    /// The proxy publishes [`ProxyEvent`]s on a broker.
    Broker(&'a ProxyBroker<R>),
}

impl<R> fmt::Debug for ProxyEvents<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyEvents::Callbacks(_) => write!(f, "ProxyEvents::Callbacks"),
            ProxyEvents::Broker(_) => write!(f, "ProxyEvents::Broker"),
        }
    }
}

/// Channel names on a [`ProxyBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyEventKind {
    /// Inbound data.
    Data,
    /// Connection error.
    Error,
}

/// An event published by a broker-style proxy.
#[derive(Debug)]
pub enum ProxyEvent<R> {
    /// An inbound item.
    Data(R),
    /// The connection failed.
    Error(SharedError),
}

impl<R> ProxyEvent<R> {
    /// Returns the channel this event belongs on.
    pub fn kind(&self) -> ProxyEventKind {
        match self {
            ProxyEvent::Data(_) => ProxyEventKind::Data,
            ProxyEvent::Error(_) => ProxyEventKind::Error,
        }
    }
}

/// Broker used by broker-style proxies.
pub type ProxyBroker<R> = EventBroker<ProxyEventKind, ProxyEvent<R>>;

impl<R> EventBroker<ProxyEventKind, ProxyEvent<R>> {
    /// Publishes `event` on the channel matching its kind.
    pub fn emit(&self, event: ProxyEvent<R>) -> bool {
        self.publish(event.kind(), &event)
    }
}

type DataHandler<R> = Arc<dyn Fn(R) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(BoxError) + Send + Sync>;

/// Push-style handler slots for a proxy.
///
/// A proxy embeds one of these and calls [`emit_data`](Self::emit_data) and
/// [`emit_error`](Self::emit_error); the controller installs the handlers.
/// Setting a handler replaces the previous one.
pub struct ProxyCallbacks<R> {
    on_data: RwLock<Option<DataHandler<R>>>,
    on_error: RwLock<Option<ErrorHandler>>,
}

impl<R> ProxyCallbacks<R> {
    /// Creates empty handler slots.
    pub fn new() -> Self {
        Self {
            on_data: RwLock::new(None),
            on_error: RwLock::new(None),
        }
    }

    /// Installs the inbound data handler.
    pub fn set_on_data<F>(&self, f: F)
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        *self.on_data.write() = Some(Arc::new(f));
    }

    /// Installs the error handler.
    pub fn set_on_error<F>(&self, f: F)
    where
        F: Fn(BoxError) + Send + Sync + 'static,
    {
        *self.on_error.write() = Some(Arc::new(f));
    }

    /// Delivers an inbound item. Returns `false` if no handler is installed.
    pub fn emit_data(&self, item: R) -> bool {
        let handler = self.on_data.read().clone();
        match handler {
            Some(handler) => {
                handler(item);
                true
            }
            None => false,
        }
    }

    /// Reports a connection error. Returns `false` if no handler is installed.
    pub fn emit_error(&self, error: BoxError) -> bool {
        let handler = self.on_error.read().clone();
        match handler {
            Some(handler) => {
                handler(error);
                true
            }
            None => false,
        }
    }
}

impl<R> Default for ProxyCallbacks<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ProxyCallbacks<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCallbacks")
            .field("on_data", &self.on_data.read().is_some())
            .field("on_error", &self.on_error.read().is_some())
            .finish()
    }
}
