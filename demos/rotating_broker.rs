//! Broker-style proxy that rotates itself
//!
//! The proxy publishes inbound data through an event broker and asks for its
//! own replacement after a fixed number of items, the way a segmented upload
//! API closes one segment and opens the next.
//! Run with: cargo run --example rotating_broker

use resilient_stream_core::{BoxError, ProxyBroker, ProxyEvent, ProxyEvents, StreamProxy};
use resilient_stream_reconnect::{
    ConnectionController, ConnectionState, ControllerConfig, ReplacementHandle,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

const SEGMENT: usize = 3;

struct SegmentProxy {
    segment: u32,
    written: AtomicUsize,
    handle: ReplacementHandle<String, String>,
    broker: ProxyBroker<String>,
}

impl StreamProxy<String, String> for SegmentProxy {
    fn send(&self, item: String) -> Result<(), BoxError> {
        let written = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        self.broker.emit(ProxyEvent::Data(format!(
            "segment {} line {}: {}",
            self.segment, written, item
        )));
        if written == SEGMENT {
            self.handle.request_replacement();
        }
        Ok(())
    }

    fn events(&self) -> ProxyEvents<'_, String> {
        ProxyEvents::Broker(&self.broker)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let segments = Arc::new(AtomicU32::new(0));
    let s = Arc::clone(&segments);
    let factory = tower::service_fn(move |handle: ReplacementHandle<String, String>| {
        let segment = s.fetch_add(1, Ordering::SeqCst) + 1;
        let proxy = SegmentProxy {
            segment,
            written: AtomicUsize::new(0),
            handle,
            broker: ProxyBroker::<String>::new(),
        };
        async move { Ok::<_, BoxError>(proxy) }
    });

    let config = ControllerConfig::builder().name("segments").build();
    let controller = ConnectionController::new(factory, config);
    controller.on_data(|line: &String| println!("{line}"));

    controller.request_replacement();
    for n in 1..=8 {
        // A rotation leaves the controller connecting until the next segment opens.
        while controller.state() != ConnectionState::Ready {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.send(format!("record {n}"));
    }

    println!("used {} segments", segments.load(Ordering::SeqCst));
    controller.destroy();
}
