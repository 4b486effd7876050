//! Ordered, buffered sessions over self-replacing stream connections.
//!
//! A [`Session`] is the handle callers hold. Outbound items are queued in
//! submission order and drained into a
//! [`ConnectionController`](resilient_stream_reconnect::ConnectionController),
//! which keeps one live proxy and rebuilds it whenever it fails.
//!
//! # Guarantees
//!
//! - **Lazy connect**: the proxy factory is not called until the first send
//! - **Strict order**: items reach the proxy in the order they were sent, across
//!   any number of replacements
//! - **No skipped head**: an item leaves the buffer only once the current proxy
//!   accepted it, so an item rejected by a failing proxy is retried first on the
//!   next one
//! - **Non-throwing**: `send` and `destroy` never fail; errors surface on the
//!   `error` event or in the log
//!
//! Delivery is at-least-once from the proxy's point of view: an item whose
//! hand-off failed inside the proxy is offered again to the replacement.
//!
//! # Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use resilient_stream_core::{BoxError, ProxyCallbacks, ProxyEvents, StreamProxy};
//! use resilient_stream_reconnect::{ReconnectPolicy, ReplacementHandle};
//! use resilient_stream_session::Session;
//!
//! # struct Sink { callbacks: ProxyCallbacks<String> }
//! # impl StreamProxy<String, String> for Sink {
//! #     fn send(&self, _item: String) -> Result<(), BoxError> { Ok(()) }
//! #     fn events(&self) -> ProxyEvents<'_, String> { ProxyEvents::Callbacks(&self.callbacks) }
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let factory = tower::service_fn(|_handle: ReplacementHandle<String, String>| async {
//!     Ok::<_, BoxError>(Sink { callbacks: ProxyCallbacks::new() })
//! });
//!
//! let session = Session::builder()
//!     .name("chat")
//!     .policy(ReconnectPolicy::exponential(
//!         Duration::from_millis(100),
//!         Duration::from_secs(10),
//!     ))
//!     .max_attempts(10)
//!     .build(factory);
//!
//! session
//!     .on_data(|reply: &String| println!("reply: {reply}"))
//!     .on_error(|error| eprintln!("stream error: {error}"));
//!
//! session.send("hello".to_string());
//! # }
//! ```

mod config;
mod session;

pub use config::SessionBuilder;
pub use session::Session;

pub use resilient_stream_core::{StreamError, StreamProxy};
pub use resilient_stream_reconnect::{ConnectionState, EventKind, ReconnectPolicy, StreamEvent};
