//! Connection lifecycle states.

use std::fmt;

/// Lifecycle state of a connection controller.
///
/// ```text
/// NoProxy ──request──▶ Connecting ──factory ok──▶ Ready
///    ▲                   │    ▲                     │
///    └──attempts spent───┘    └──proxy failed───────┘
///                        └─factory failed─┘
///
/// any state ──destroy──▶ Halted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No proxy has been built yet, or the last round gave up.
    NoProxy,

    /// A replacement attempt is queued or running.
    Connecting,

    /// A proxy is installed and accepting items.
    Ready,

    /// Destroyed. No further transitions.
    Halted,
}

impl ConnectionState {
    /// Returns true once the controller has been destroyed.
    pub fn is_halted(&self) -> bool {
        matches!(self, ConnectionState::Halted)
    }

    /// Returns true while a replacement attempt is queued or running.
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Returns a stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::NoProxy => "no_proxy",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Halted => "halted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
