use resilient_stream_core::StreamError;

/// Event channels exposed by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An inbound item from the current proxy.
    Data,
    /// Any error on the controller's error path.
    Error,
    /// A replacement proxy was installed and is accepting items.
    Ready,
}

/// Events emitted by a connection controller.
#[derive(Debug)]
pub enum StreamEvent<R> {
    /// An inbound item, forwarded verbatim.
    Data(R),
    /// An error from construction, send, teardown or a live proxy.
    Error(StreamError),
    /// A new proxy is installed.
    Ready,
}

impl<R> StreamEvent<R> {
    /// Returns the channel this event is published on.
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Data(_) => EventKind::Data,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::Ready => EventKind::Ready,
        }
    }
}
