//! Ordered buffering over a connection controller.

use parking_lot::Mutex;
use resilient_stream_core::{BoxError, EventListener, StreamError, StreamProxy};
use resilient_stream_reconnect::{
    ConnectionController, ConnectionState, ControllerConfig, EventKind, ReplacementHandle,
    StreamEvent,
};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use tower::Service;
use tracing::debug;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::config::SessionBuilder;

struct Buffer<T> {
    items: VecDeque<T>,
    /// Set while one caller drains the buffer. Other callers only enqueue.
    flushing: bool,
    /// Set when a flush was requested while another was running, so the
    /// running flush tries once more before giving up.
    rerun: bool,
    /// The first send connects unconditionally.
    started: bool,
    halted: bool,
}

struct Inner<T, R> {
    controller: ConnectionController<T, R>,
    buffer: Mutex<Buffer<T>>,
}

impl<T, R> Inner<T, R> {
    fn name(&self) -> &str {
        self.controller.config().name()
    }

    fn destroy(&self) {
        let dropped = {
            let mut buffer = self.buffer.lock();
            if buffer.halted {
                return;
            }
            buffer.halted = true;
            let dropped = buffer.items.len();
            buffer.items.clear();
            dropped
        };

        debug!(stream = %self.name(), dropped, "session halted");
        self.record_buffered(0);
        self.controller.destroy();
    }

    fn record_buffered(&self, _len: usize) {
        #[cfg(feature = "metrics")]
        gauge!("resilient_stream_buffered_items", "stream" => self.name().to_string())
            .set(_len as f64);
    }
}

impl<T, R> Inner<T, R>
where
    T: Clone,
{
    fn send(&self, item: T) -> bool {
        let (flush, len) = {
            let mut buffer = self.buffer.lock();
            if buffer.halted {
                return false;
            }
            buffer.items.push_back(item);
            let first = !buffer.started;
            buffer.started = true;
            // An idle controller (after giving up) needs a send to start a new round.
            let flush = first
                || self.controller.is_ready()
                || self.controller.state() == ConnectionState::NoProxy;
            (flush, buffer.items.len())
        };

        self.record_buffered(len);
        if flush {
            self.flush();
        }
        true
    }

    /// Drains the buffer head first while the controller accepts items.
    ///
    /// The head is offered to the controller and only removed once accepted,
    /// so a rejected item is retried by the next flush in its original place.
    fn flush(&self) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.halted {
                return;
            }
            if buffer.flushing {
                buffer.rerun = true;
                return;
            }
            buffer.flushing = true;
            buffer.rerun = false;
        }

        loop {
            let head = {
                let mut buffer = self.buffer.lock();
                match buffer.items.front() {
                    Some(head) if !buffer.halted => head.clone(),
                    _ => {
                        buffer.flushing = false;
                        return;
                    }
                }
            };

            if self.controller.send(head) {
                let remaining = {
                    let mut buffer = self.buffer.lock();
                    buffer.items.pop_front();
                    buffer.items.len()
                };
                debug!(stream = %self.name(), remaining, "buffered item delivered");

                #[cfg(feature = "metrics")]
                counter!("resilient_stream_items_sent_total", "stream" => self.name().to_string())
                    .increment(1);
                self.record_buffered(remaining);
                continue;
            }

            let mut buffer = self.buffer.lock();
            if buffer.rerun && !buffer.halted {
                buffer.rerun = false;
                // A replacement in progress publishes Ready once it lands, which
                // restarts the drain.
                if !self.controller.state().is_connecting() {
                    continue;
                }
            }
            buffer.flushing = false;
            debug!(stream = %self.name(), remaining = buffer.items.len(), "flush paused until ready");
            return;
        }
    }
}

/// Flushes the session whenever the controller installs a new proxy.
struct FlushOnReady<T, R> {
    inner: Weak<Inner<T, R>>,
}

impl<T, R> EventListener<StreamEvent<R>> for FlushOnReady<T, R>
where
    T: Clone + Send,
    R: Send + Sync,
{
    fn on_event(&self, _event: &StreamEvent<R>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.flush();
        }
    }
}

/// The caller-facing handle to a replaceable stream.
///
/// Items passed to [`send`](Self::send) are buffered in submission order and
/// handed to the controller as soon as it can take them. The connection is
/// established lazily by the first send, and every later proxy replacement
/// resumes the drain where the previous proxy left off.
///
/// Dropping the session destroys it, discarding anything still buffered.
///
/// # Examples
///
/// ```rust
/// use resilient_stream_core::{BoxError, ProxyCallbacks, ProxyEvents, StreamProxy};
/// use resilient_stream_reconnect::ReplacementHandle;
/// use resilient_stream_session::Session;
/// use std::sync::{Arc, Mutex};
///
/// struct Recorder {
///     seen: Arc<Mutex<Vec<u32>>>,
///     callbacks: ProxyCallbacks<u32>,
/// }
///
/// impl StreamProxy<u32, u32> for Recorder {
///     fn send(&self, item: u32) -> Result<(), BoxError> {
///         self.seen.lock().unwrap().push(item);
///         Ok(())
///     }
///
///     fn events(&self) -> ProxyEvents<'_, u32> {
///         ProxyEvents::Callbacks(&self.callbacks)
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let s = Arc::clone(&seen);
/// let factory = tower::service_fn(move |_handle: ReplacementHandle<u32, u32>| {
///     let proxy = Recorder { seen: Arc::clone(&s), callbacks: ProxyCallbacks::new() };
///     async move { Ok::<_, BoxError>(proxy) }
/// });
///
/// let session = Session::builder().name("ticks").build(factory);
/// for n in 1..=3 {
///     assert!(session.send(n));
/// }
///
/// while !session.is_empty() {
///     tokio::time::sleep(std::time::Duration::from_millis(1)).await;
/// }
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
/// # }
/// ```
pub struct Session<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Session<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Creates a session with the default configuration.
    ///
    /// Must be called from within a Tokio runtime. The factory is not called
    /// until the first [`send`](Self::send).
    pub fn new<F>(factory: F) -> Self
    where
        F: Service<ReplacementHandle<T, R>> + Send + 'static,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
        F::Future: Send + 'static,
    {
        Self::with_config(factory, ControllerConfig::default())
    }

    pub(crate) fn with_config<F>(factory: F, config: ControllerConfig) -> Self
    where
        F: Service<ReplacementHandle<T, R>> + Send + 'static,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
        F::Future: Send + 'static,
    {
        let inner = Arc::new(Inner {
            controller: ConnectionController::new(factory, config),
            buffer: Mutex::new(Buffer {
                items: VecDeque::new(),
                flushing: false,
                rerun: false,
                started: false,
                halted: false,
            }),
        });

        inner.controller.on(
            EventKind::Ready,
            FlushOnReady {
                inner: Arc::downgrade(&inner),
            },
        );

        Self { inner }
    }

    /// Buffers an item and delivers whatever the connection can take.
    ///
    /// Returns `false` only after [`destroy`](Self::destroy). Acceptance does
    /// not imply delivery: the item stays buffered until the current proxy
    /// takes it.
    pub fn send(&self, item: T) -> bool {
        self.inner.send(item)
    }

    /// Registers a listener on one of the controller's event channels.
    pub fn on<L>(&self, kind: EventKind, listener: L) -> &Self
    where
        L: EventListener<StreamEvent<R>> + 'static,
    {
        self.inner.controller.on(kind, listener);
        self
    }

    /// Registers a handler for inbound data.
    pub fn on_data<F>(&self, f: F) -> &Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.inner.controller.on_data(f);
        self
    }

    /// Registers a handler for errors.
    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.inner.controller.on_error(f);
        self
    }

    /// Registers a handler called each time a new proxy is ready.
    pub fn on_ready<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.controller.on_ready(f);
        self
    }
}

impl<T, R> Session<T, R> {
    /// Creates a builder for configuring a session.
    pub fn builder() -> SessionBuilder<T, R> {
        SessionBuilder::new()
    }

    /// Halts the session, drops every buffered item and destroys the
    /// connection. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Returns true when nothing is waiting for delivery.
    pub fn is_empty(&self) -> bool {
        self.inner.buffer.lock().items.is_empty()
    }

    /// Returns the number of items waiting for delivery.
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().items.len()
    }

    /// Returns true if the underlying controller holds a live proxy.
    pub fn is_ready(&self) -> bool {
        self.inner.controller.is_ready()
    }

    /// Returns the underlying controller's state.
    pub fn state(&self) -> ConnectionState {
        self.inner.controller.state()
    }

    /// Returns the underlying controller.
    pub fn controller(&self) -> &ConnectionController<T, R> {
        &self.inner.controller
    }
}

impl<T, R> Drop for Session<T, R> {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl<T, R> fmt::Debug for Session<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.inner.buffer.lock();
        f.debug_struct("Session")
            .field("name", &self.inner.name())
            .field("buffered", &buffer.items.len())
            .field("halted", &buffer.halted)
            .field("state", &self.inner.controller.state())
            .finish()
    }
}
