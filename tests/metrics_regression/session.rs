//! Session metrics regression tests

use super::helpers::*;
use crate::common::{Plan, ScriptedFactory, eventually};
use resilient_stream_session::Session;

#[tokio::test]
async fn session_metrics_exist() {
    init_recorder();

    let (factory, _recorder) = ScriptedFactory::new(Plan::default());
    let session = Session::builder().name("metrics_session").build(factory);

    for n in 0..3 {
        session.send(n);
    }
    eventually(|| session.is_empty()).await;

    assert_counter_exists("resilient_stream_items_sent_total");
    assert_metric_has_label(
        "resilient_stream_items_sent_total",
        "stream",
        "metrics_session",
    );

    assert_gauge_exists("resilient_stream_buffered_items");
    assert_metric_has_label(
        "resilient_stream_buffered_items",
        "stream",
        "metrics_session",
    );
}
