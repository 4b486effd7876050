//! Connection controller implementation.
//!
//! The controller owns at most one live proxy. Replacement attempts never run
//! on the caller's stack: [`ConnectionController::request_replacement`] flips
//! the state to `Connecting` and queues one attempt on a worker task owned by
//! the controller. The worker is the only place the factory is called, so
//! attempts are serialized and requests that arrive while one is queued or
//! running are coalesced into it.

use crate::config::ControllerConfig;
use crate::events::{EventKind, StreamEvent};
use crate::state::ConnectionState;
use parking_lot::Mutex;
use resilient_stream_core::{
    BoxError, BoxProxy, EventBroker, EventListener, FnListener, ProxyEvent, ProxyEventKind,
    ProxyEvents, SharedError, StreamError, StreamProxy,
};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use metrics::counter;

struct Installed<T, R> {
    proxy: BoxProxy<T, R>,
    generation: u64,
}

struct Slot<T, R> {
    state: ConnectionState,
    current: Option<Installed<T, R>>,
    /// Bumped for every installed proxy so late events from a retired proxy
    /// cannot trigger a replacement of its successor.
    generation: u64,
    /// Consecutive construction failures in the current round.
    failures: u32,
    /// Dropped on halt, which ends the worker once its queue drains.
    worker: Option<mpsc::UnboundedSender<()>>,
}

struct Shared<T, R> {
    config: ControllerConfig,
    slot: Mutex<Slot<T, R>>,
    events: EventBroker<EventKind, StreamEvent<R>>,
}

enum AfterFailure {
    Retry,
    GiveUp(u32),
    Halted,
}

impl<T, R> Shared<T, R> {
    fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    fn is_ready(&self) -> bool {
        let slot = self.slot.lock();
        !slot.state.is_halted() && slot.current.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        let slot = self.slot.lock();
        !slot.state.is_halted()
            && slot
                .current
                .as_ref()
                .is_some_and(|current| current.generation == generation)
    }

    fn request_replacement(&self) {
        let mut slot = self.slot.lock();
        if slot.state.is_halted() || slot.state.is_connecting() {
            return;
        }

        let queued = slot
            .worker
            .as_ref()
            .is_some_and(|worker| worker.send(()).is_ok());
        if queued {
            slot.state = ConnectionState::Connecting;
            debug!(stream = %self.config.name, "replacement requested");
        }
    }

    fn send(&self, item: T) -> bool {
        let current = {
            let slot = self.slot.lock();
            if slot.state.is_halted() {
                return false;
            }
            slot.current
                .as_ref()
                .map(|current| (Arc::clone(&current.proxy), current.generation))
        };

        let Some((proxy, generation)) = current else {
            self.request_replacement();
            return false;
        };

        match proxy.send(item) {
            Ok(()) => true,
            Err(error) => {
                debug!(stream = %self.config.name, generation, "proxy rejected item");
                self.report(StreamError::Send(error));
                if self.is_current(generation) {
                    self.request_replacement();
                }
                false
            }
        }
    }

    fn destroy(&self) {
        let retired = {
            let mut slot = self.slot.lock();
            if slot.state.is_halted() {
                return;
            }
            slot.state = ConnectionState::Halted;
            slot.worker = None;
            slot.current.take()
        };

        debug!(stream = %self.config.name, "controller halted");
        if let Some(retired) = retired {
            self.destroy_proxy(&retired.proxy);
        }
    }

    fn destroy_proxy(&self, proxy: &BoxProxy<T, R>) {
        if let Err(error) = proxy.destroy() {
            self.report(StreamError::Destroy(error));
        }
    }

    /// The single error path. Unobserved errors go to the log instead.
    fn report(&self, error: StreamError) {
        #[cfg(feature = "metrics")]
        counter!(
            "resilient_stream_errors_total",
            "stream" => self.config.name.clone(),
            "kind" => error.kind().as_str()
        )
        .increment(1);

        let event = StreamEvent::Error(error);
        if self.events.publish(EventKind::Error, &event) {
            return;
        }
        if let StreamEvent::Error(error) = event {
            warn!(stream = %self.config.name, error = %error, "stream error with no error listener");
        }
    }

    fn forward_data(&self, item: R) {
        self.events.publish(EventKind::Data, &StreamEvent::Data(item));
    }

    fn proxy_failed(&self, generation: u64, error: SharedError) {
        debug!(stream = %self.config.name, generation, "proxy reported an error");
        self.report(StreamError::Proxy(error));
        if self.is_current(generation) {
            self.request_replacement();
        }
    }
}

impl<T, R> Shared<T, R>
where
    T: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Runs one queued replacement attempt. Called only from the worker.
    async fn replace<F>(this: &Arc<Self>, factory: &mut F)
    where
        F: Service<ReplacementHandle<T, R>>,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
    {
        let (retired, failures) = {
            let mut slot = this.slot.lock();
            if slot.state.is_halted() {
                return;
            }
            (slot.current.take(), slot.failures)
        };

        debug!(stream = %this.config.name, failures, "replacing stream proxy");
        if let Some(retired) = retired {
            this.destroy_proxy(&retired.proxy);
        }

        if let Some(retry) = (failures as usize).checked_sub(1) {
            if let Some(delay) = this.config.policy.delay_for_retry(retry) {
                debug!(stream = %this.config.name, ?delay, "backing off before next attempt");
                tokio::time::sleep(delay).await;
                if this.state().is_halted() {
                    return;
                }
            }
        }

        let handle = ReplacementHandle {
            shared: Arc::downgrade(this),
        };
        match build(factory, handle).await {
            Ok(proxy) => Self::install(this, Arc::new(proxy)).await,
            Err(error) => this.construction_failed(error),
        }
    }

    async fn install(this: &Arc<Self>, proxy: BoxProxy<T, R>) {
        // Handlers are attached before the proxy becomes reachable through the slot.
        let generation = {
            let mut slot = this.slot.lock();
            if slot.state.is_halted() {
                None
            } else {
                slot.generation += 1;
                Some(slot.generation)
            }
        };
        let Some(generation) = generation else {
            debug!(stream = %this.config.name, "halted during construction, discarding new proxy");
            this.destroy_proxy(&proxy);
            return;
        };

        Self::wire(this, &proxy, generation);

        let installed = {
            let mut slot = this.slot.lock();
            if slot.state.is_halted() {
                false
            } else {
                slot.current = Some(Installed {
                    proxy: Arc::clone(&proxy),
                    generation,
                });
                slot.state = ConnectionState::Ready;
                slot.failures = 0;
                true
            }
        };
        if !installed {
            debug!(stream = %this.config.name, generation, "halted while wiring, discarding new proxy");
            this.destroy_proxy(&proxy);
            return;
        }

        debug!(stream = %this.config.name, generation, "stream proxy installed");

        #[cfg(feature = "metrics")]
        counter!(
            "resilient_stream_replacements_total",
            "stream" => this.config.name.clone(),
            "outcome" => "success"
        )
        .increment(1);

        tokio::task::yield_now().await;
        if this.is_current(generation) {
            this.events.publish(EventKind::Ready, &StreamEvent::Ready);
        }
    }

    fn wire(this: &Arc<Self>, proxy: &BoxProxy<T, R>, generation: u64) {
        match proxy.events() {
            ProxyEvents::Callbacks(callbacks) => {
                let shared = Arc::downgrade(this);
                callbacks.set_on_data(move |item| {
                    if let Some(shared) = shared.upgrade() {
                        shared.forward_data(item);
                    }
                });

                let shared = Arc::downgrade(this);
                callbacks.set_on_error(move |error: BoxError| {
                    if let Some(shared) = shared.upgrade() {
                        shared.proxy_failed(generation, SharedError::from(error));
                    }
                });
            }
            ProxyEvents::Broker(broker) => {
                let shared = Arc::downgrade(this);
                broker.subscribe_fn(ProxyEventKind::Data, move |event: &ProxyEvent<R>| {
                    if let (ProxyEvent::Data(item), Some(shared)) = (event, shared.upgrade()) {
                        shared.forward_data(item.clone());
                    }
                });

                let shared = Arc::downgrade(this);
                broker.subscribe_fn(ProxyEventKind::Error, move |event: &ProxyEvent<R>| {
                    if let (ProxyEvent::Error(error), Some(shared)) = (event, shared.upgrade()) {
                        shared.proxy_failed(generation, Arc::clone(error));
                    }
                });
            }
        }
    }

    fn construction_failed(&self, error: BoxError) {
        let after = {
            let mut slot = self.slot.lock();
            if slot.state.is_halted() {
                AfterFailure::Halted
            } else {
                slot.failures += 1;
                slot.state = ConnectionState::NoProxy;
                match self.config.max_attempts {
                    Some(max) if slot.failures >= max => {
                        let attempts = slot.failures;
                        slot.failures = 0;
                        AfterFailure::GiveUp(attempts)
                    }
                    _ => AfterFailure::Retry,
                }
            }
        };

        debug!(stream = %self.config.name, error = %error, "failed to construct stream proxy");

        #[cfg(feature = "metrics")]
        counter!(
            "resilient_stream_replacements_total",
            "stream" => self.config.name.clone(),
            "outcome" => "failure"
        )
        .increment(1);

        self.report(StreamError::Construction(error));
        match after {
            AfterFailure::Retry => self.request_replacement(),
            AfterFailure::GiveUp(attempts) => {
                self.report(StreamError::AttemptsExhausted { attempts })
            }
            AfterFailure::Halted => {}
        }
    }
}

impl<T, R> Drop for Shared<T, R> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if slot.state.is_halted() {
            return;
        }
        if let Some(current) = slot.current.take() {
            if let Err(error) = current.proxy.destroy() {
                warn!(stream = %self.config.name, error = %error, "failed to destroy stream proxy on drop");
            }
        }
    }
}

async fn build<F, T, R>(
    factory: &mut F,
    handle: ReplacementHandle<T, R>,
) -> Result<F::Response, BoxError>
where
    F: Service<ReplacementHandle<T, R>>,
    F::Error: Into<BoxError>,
{
    let factory = factory.ready().await.map_err(Into::into)?;
    factory.call(handle).await.map_err(Into::into)
}

async fn run_worker<T, R, F>(
    shared: Weak<Shared<T, R>>,
    mut factory: F,
    mut requests: mpsc::UnboundedReceiver<()>,
) where
    T: Send + 'static,
    R: Clone + Send + Sync + 'static,
    F: Service<ReplacementHandle<T, R>>,
    F::Response: StreamProxy<T, R> + 'static,
    F::Error: Into<BoxError>,
{
    while requests.recv().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        Shared::replace(&shared, &mut factory).await;
    }
}

/// Owns the current stream proxy and replaces it when it fails.
///
/// Cloning a controller is cheap and every clone refers to the same
/// connection. Dropping the last clone stops the worker task and destroys the
/// installed proxy.
///
/// The factory is a [`tower::Service`] that receives a [`ReplacementHandle`]
/// and resolves to a new proxy. It is not called until a replacement is first
/// requested, either explicitly or by a [`send`](Self::send) with no proxy
/// installed.
///
/// Must be created from within a Tokio runtime.
pub struct ConnectionController<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for ConnectionController<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> ConnectionController<T, R>
where
    T: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Creates a controller and spawns its worker task.
    pub fn new<F>(factory: F, config: ControllerConfig) -> Self
    where
        F: Service<ReplacementHandle<T, R>> + Send + 'static,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
        F::Future: Send + 'static,
    {
        let (worker, requests) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            slot: Mutex::new(Slot {
                state: ConnectionState::NoProxy,
                current: None,
                generation: 0,
                failures: 0,
                worker: Some(worker),
            }),
            events: EventBroker::new(),
        });

        tokio::spawn(run_worker(Arc::downgrade(&shared), factory, requests));
        Self { shared }
    }

    /// Creates a controller with the default configuration.
    pub fn with_defaults<F>(factory: F) -> Self
    where
        F: Service<ReplacementHandle<T, R>> + Send + 'static,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
        F::Future: Send + 'static,
    {
        Self::new(factory, ControllerConfig::default())
    }

    /// Registers a listener on one event channel.
    pub fn on<L>(&self, kind: EventKind, listener: L) -> &Self
    where
        L: EventListener<StreamEvent<R>> + 'static,
    {
        self.shared.events.subscribe(kind, listener);
        self
    }

    /// Registers a handler for inbound data.
    pub fn on_data<F>(&self, f: F) -> &Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.on(
            EventKind::Data,
            FnListener::new(move |event: &StreamEvent<R>| {
                if let StreamEvent::Data(item) = event {
                    f(item);
                }
            }),
        )
    }

    /// Registers a handler for errors.
    ///
    /// With no error handler registered, errors are logged at `warn` level.
    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.on(
            EventKind::Error,
            FnListener::new(move |event: &StreamEvent<R>| {
                if let StreamEvent::Error(error) = event {
                    f(error);
                }
            }),
        )
    }

    /// Registers a handler called each time a new proxy is ready.
    pub fn on_ready<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(
            EventKind::Ready,
            FnListener::new(move |event: &StreamEvent<R>| {
                if let StreamEvent::Ready = event {
                    f();
                }
            }),
        )
    }
}

impl<T, R> ConnectionController<T, R> {
    /// Returns the configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns true if the controller is not halted and holds a proxy.
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Hands an item to the current proxy.
    ///
    /// Returns `true` only if the proxy accepted it. With no proxy installed,
    /// this requests a replacement and returns `false`; callers retry once the
    /// `ready` event fires. A proxy error is reported on the `error` event,
    /// triggers a replacement, and returns `false`. The item is not retried
    /// here.
    pub fn send(&self, item: T) -> bool {
        self.shared.send(item)
    }

    /// Queues a replacement attempt.
    ///
    /// A no-op after [`destroy`](Self::destroy) or while another attempt is
    /// queued or running. After a construction failure another attempt is
    /// queued automatically, spaced by the configured policy.
    pub fn request_replacement(&self) {
        self.shared.request_replacement();
    }

    /// Halts the controller and destroys the current proxy.
    ///
    /// Idempotent. An attempt already running is not cancelled, but the proxy
    /// it produces is destroyed on arrival. Every later call is a no-op.
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Returns a weak handle, the same kind the factory receives.
    pub fn handle(&self) -> ReplacementHandle<T, R> {
        ReplacementHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Returns true if at least one listener is registered for `kind`.
    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.shared.events.has_listeners(kind)
    }
}

impl<T, R> fmt::Debug for ConnectionController<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.shared.slot.lock();
        f.debug_struct("ConnectionController")
            .field("name", &self.shared.config.name)
            .field("state", &slot.state)
            .field("installed", &slot.current.is_some())
            .finish()
    }
}

/// A weak handle to a controller.
///
/// The factory receives one with every call so a proxy can ask for its own
/// replacement, e.g. at a protocol-driven rotation point, without keeping the
/// controller alive. Every method is a no-op once the controller is gone.
pub struct ReplacementHandle<T, R> {
    shared: Weak<Shared<T, R>>,
}

impl<T, R> Clone for ReplacementHandle<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T, R> ReplacementHandle<T, R> {
    /// Queues a replacement attempt, see [`ConnectionController::request_replacement`].
    pub fn request_replacement(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.request_replacement();
        }
    }

    /// Returns the controller's state, or `Halted` if it was dropped.
    pub fn state(&self) -> ConnectionState {
        self.shared
            .upgrade()
            .map_or(ConnectionState::Halted, |shared| shared.state())
    }

    /// Returns true if the controller is alive, not halted, and holds a proxy.
    pub fn is_ready(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| shared.is_ready())
    }
}

impl<T, R> fmt::Debug for ReplacementHandle<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplacementHandle")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
