//! Self-replacing stream connections.
//!
//! This crate provides [`ConnectionController`], which keeps one live stream
//! proxy behind a stable handle and silently rebuilds it whenever it fails,
//! rotates, or is replaced on request.
//!
//! # Features
//!
//! - **Single-flight replacement**: overlapping replacement requests collapse
//!   into one factory call
//! - **Deferred attempts**: replacements run on a per-controller worker task,
//!   never on the caller's stack
//! - **Pluggable backoff**: retry immediately (the default) or reuse an
//!   `IntervalFunction` (fixed, exponential, randomized, custom)
//! - **Event channels**: inbound `data`, `error` and `ready` events
//! - **tower integration**: the proxy factory is any `tower::Service`
//!
//! # Examples
//!
//! ```rust
//! use resilient_stream_core::{BoxError, ProxyCallbacks, ProxyEvents, StreamProxy};
//! use resilient_stream_reconnect::{ConnectionController, ControllerConfig, ReplacementHandle};
//! use tokio::sync::mpsc;
//!
//! struct ChannelProxy {
//!     tx: mpsc::UnboundedSender<String>,
//!     callbacks: ProxyCallbacks<String>,
//! }
//!
//! impl StreamProxy<String, String> for ChannelProxy {
//!     fn send(&self, item: String) -> Result<(), BoxError> {
//!         self.tx.send(item).map_err(|e| e.to_string().into())
//!     }
//!
//!     fn events(&self) -> ProxyEvents<'_, String> {
//!         ProxyEvents::Callbacks(&self.callbacks)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (tx, mut rx) = mpsc::unbounded_channel();
//!
//! let factory = tower::service_fn(move |_handle: ReplacementHandle<String, String>| {
//!     let proxy = ChannelProxy { tx: tx.clone(), callbacks: ProxyCallbacks::new() };
//!     async move { Ok::<_, BoxError>(proxy) }
//! });
//!
//! let config = ControllerConfig::builder().name("orders").build();
//! let controller = ConnectionController::new(factory, config);
//!
//! let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
//! controller.on_ready(move || {
//!     let _ = ready_tx.send(());
//! });
//!
//! // Nothing is connected yet: the first send triggers the factory.
//! assert!(!controller.send("hello".to_string()));
//! ready_rx.recv().await.unwrap();
//!
//! assert!(controller.send("hello".to_string()));
//! assert_eq!(rx.recv().await.unwrap(), "hello");
//! controller.destroy();
//! # }
//! ```

mod backoff;
mod config;
mod controller;
mod events;
mod policy;
mod state;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
};
pub use config::{ControllerConfig, ControllerConfigBuilder};
pub use controller::{ConnectionController, ReplacementHandle};
pub use events::{EventKind, StreamEvent};
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
