use crate::session::Session;
use resilient_stream_core::{BoxError, StreamProxy};
use resilient_stream_reconnect::{
    ControllerConfig, ControllerConfigBuilder, ReconnectPolicy, ReplacementHandle,
};
use std::fmt;
use std::marker::PhantomData;
use tower::Service;

/// Builder for [`Session`].
///
/// Every setting is forwarded to the underlying connection controller.
pub struct SessionBuilder<T, R> {
    controller: ControllerConfigBuilder,
    _marker: PhantomData<fn(T) -> R>,
}

impl<T, R> SessionBuilder<T, R> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            controller: ControllerConfig::builder(),
            _marker: PhantomData,
        }
    }

    /// Sets the instance name used in logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.controller = self.controller.name(name);
        self
    }

    /// Sets the delay strategy between failed construction attempts.
    ///
    /// Defaults to [`ReconnectPolicy::Immediate`].
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.controller = self.controller.policy(policy);
        self
    }

    /// Stops retrying after `max_attempts` consecutive construction failures.
    ///
    /// Buffered items are kept. The next send starts a fresh round.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.controller = self.controller.max_attempts(max_attempts);
        self
    }

    /// Retries construction failures forever (the default).
    pub fn unlimited_attempts(mut self) -> Self {
        self.controller = self.controller.unlimited_attempts();
        self
    }
}

impl<T, R> SessionBuilder<T, R>
where
    T: Clone + Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Builds the session around `factory`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build<F>(self, factory: F) -> Session<T, R>
    where
        F: Service<ReplacementHandle<T, R>> + Send + 'static,
        F::Response: StreamProxy<T, R> + 'static,
        F::Error: Into<BoxError>,
        F::Future: Send + 'static,
    {
        Session::with_config(factory, self.controller.build())
    }
}

impl<T, R> Default for SessionBuilder<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for SessionBuilder<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("controller", &self.controller)
            .finish()
    }
}
