use crate::policy::ReconnectPolicy;

const DEFAULT_NAME: &str = "<unnamed>";

/// Configuration for a connection controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Instance name attached to every log line and metric.
    pub(crate) name: String,

    /// Delay strategy between failed construction attempts.
    pub(crate) policy: ReconnectPolicy,

    /// Bound on consecutive construction failures before the controller
    /// stops retrying on its own. `None` retries forever.
    pub(crate) max_attempts: Option<u32>,
}

impl ControllerConfig {
    /// Creates a new builder.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the replacement policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns the bound on consecutive construction failures.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfigBuilder::default().build()
    }
}

/// Builder for [`ControllerConfig`].
#[derive(Debug, Clone)]
pub struct ControllerConfigBuilder {
    name: String,
    policy: ReconnectPolicy,
    max_attempts: Option<u32>,
}

impl ControllerConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name used in logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the delay strategy between failed construction attempts.
    ///
    /// The default, [`ReconnectPolicy::Immediate`], retries without waiting.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use resilient_stream_reconnect::{ControllerConfig, ReconnectPolicy};
    ///
    /// let config = ControllerConfig::builder()
    ///     .policy(ReconnectPolicy::exponential(
    ///         Duration::from_millis(50),
    ///         Duration::from_secs(5),
    ///     ))
    ///     .build();
    /// ```
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stops retrying after `max_attempts` consecutive construction failures.
    ///
    /// When the bound is hit the controller reports
    /// `StreamError::AttemptsExhausted` and waits for the next send or explicit
    /// replacement request to start over.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_stream_reconnect::ControllerConfig;
    ///
    /// let config = ControllerConfig::builder().max_attempts(5).build();
    /// assert_eq!(config.max_attempts(), Some(5));
    /// ```
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Retries construction failures forever (the default).
    pub fn unlimited_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ControllerConfig {
        ControllerConfig {
            name: self.name,
            policy: self.policy,
            max_attempts: self.max_attempts,
        }
    }
}

impl Default for ControllerConfigBuilder {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            policy: ReconnectPolicy::default(),
            max_attempts: None,
        }
    }
}
