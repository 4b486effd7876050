//! Session over a proxy that drops every few items
//!
//! Each proxy accepts a handful of items and then fails, so the session keeps
//! replacing it while preserving submission order.
//! Run with: cargo run --example flaky_feed

use parking_lot::Mutex;
use resilient_stream_core::{BoxError, ProxyCallbacks, ProxyEvents, StreamProxy};
use resilient_stream_reconnect::ReplacementHandle;
use resilient_stream_session::Session;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

/// Accepts `budget` items, then starts failing.
struct FlakyProxy {
    id: u32,
    budget: AtomicUsize,
    delivered: Arc<Mutex<Vec<u32>>>,
    callbacks: ProxyCallbacks<String>,
}

impl StreamProxy<u32, String> for FlakyProxy {
    fn send(&self, item: u32) -> Result<(), BoxError> {
        let left = self.budget.load(Ordering::SeqCst);
        if left == 0 {
            return Err(format!("proxy {} is worn out", self.id).into());
        }
        self.budget.store(left - 1, Ordering::SeqCst);
        self.delivered.lock().push(item);
        self.callbacks
            .emit_data(format!("proxy {} acked {}", self.id, item));
        Ok(())
    }

    fn destroy(&self) -> Result<(), BoxError> {
        println!("proxy {} destroyed", self.id);
        Ok(())
    }

    fn events(&self) -> ProxyEvents<'_, String> {
        ProxyEvents::Callbacks(&self.callbacks)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let next_id = Arc::new(AtomicU32::new(1));

    let d = Arc::clone(&delivered);
    let factory = tower::service_fn(move |_handle: ReplacementHandle<u32, String>| {
        let id = next_id.fetch_add(1, Ordering::SeqCst);
        println!("building proxy {id}");
        let proxy = FlakyProxy {
            id,
            budget: AtomicUsize::new(4),
            delivered: Arc::clone(&d),
            callbacks: ProxyCallbacks::new(),
        };
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, BoxError>(proxy)
        }
    });

    let session = Session::builder().name("flaky-feed").build(factory);
    session
        .on_data(|ack: &String| println!("  {ack}"))
        .on_error(|error| println!("  error: {error}"))
        .on_ready(|| println!("  ready"));

    // Several producers share the session.
    let session = Arc::new(session);
    let producers = (0..3u32).map(|producer| {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            for n in 0..5 {
                session.send(producer * 100 + n);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    });
    futures::future::join_all(producers).await;

    while !session.is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    println!("\ndelivered {} items: {:?}", delivered.lock().len(), delivered.lock());
    session.destroy();
}
