use crate::common::{Counter, Errors, Plan, Recorder, ScriptedFactory, eventually, settled};
use resilient_stream_reconnect::{
    ConnectionController, ConnectionState, ControllerConfig, ReconnectPolicy,
};
use std::sync::Arc;
use std::time::Duration;

struct Observed {
    controller: ConnectionController<u32, u32>,
    recorder: Arc<Recorder>,
    errors: Errors,
    ready: Counter,
}

fn observed(plan: Plan, config: ControllerConfig) -> Observed {
    let (factory, recorder) = ScriptedFactory::new(plan);
    let controller = ConnectionController::new(factory, config);
    let errors = Errors::default();
    let ready = Counter::default();
    controller
        .on_error(errors.handler())
        .on_ready(ready.handler());

    Observed {
        controller,
        recorder,
        errors,
        ready,
    }
}

#[tokio::test]
async fn factory_rejects_twice_then_succeeds() {
    let o = observed(
        Plan {
            reject_first: 2,
            ..Default::default()
        },
        ControllerConfig::default(),
    );

    o.controller.request_replacement();
    eventually(|| o.ready.get() == 1).await;

    assert_eq!(o.recorder.builds(), 3);
    assert_eq!(o.errors.kinds(), vec!["construction", "construction"]);
    assert_eq!(o.controller.state(), ConnectionState::Ready);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(o.ready.get(), 1);
    assert_eq!(o.recorder.builds(), 3);
}

#[tokio::test]
async fn send_failure_is_reported_and_replaces_proxy() {
    let o = observed(
        Plan {
            fail_on: Some(2),
            failing_proxies: Some(1),
            ..Default::default()
        },
        ControllerConfig::default(),
    );

    o.controller.request_replacement();
    settled(|| o.controller.state()).await;

    assert!(o.controller.send(1));
    assert!(!o.controller.send(2));
    assert_eq!(o.errors.kinds(), vec!["send"]);
    assert_eq!(o.controller.state(), ConnectionState::Connecting);

    eventually(|| o.ready.get() == 2).await;
    assert!(o.controller.send(3));

    assert_eq!(o.recorder.builds(), 2);
    assert_eq!(o.recorder.attempts(), vec![1, 2, 3]);
    assert_eq!(o.recorder.accepted_by(0), vec![1]);
    assert_eq!(o.recorder.accepted_by(1), vec![3]);
}

#[tokio::test]
async fn proxy_error_triggers_replacement() {
    let o = observed(Plan::default(), ControllerConfig::default());
    o.controller.request_replacement();
    eventually(|| o.ready.get() == 1).await;

    assert!(o.recorder.proxy(0).emit_error("stream reset".into()));

    eventually(|| o.ready.get() == 2).await;
    assert_eq!(o.errors.kinds(), vec!["proxy"]);
    assert_eq!(o.recorder.builds(), 2);
    assert_eq!(o.recorder.destroys(), 1);
}

#[tokio::test]
async fn retired_proxy_error_does_not_replace_successor() {
    let o = observed(Plan::default(), ControllerConfig::default());
    o.controller.request_replacement();
    eventually(|| o.ready.get() == 1).await;
    o.controller.request_replacement();
    eventually(|| o.ready.get() == 2).await;

    o.recorder.proxy(0).emit_error("late failure".into());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(o.errors.kinds(), vec!["proxy"]);
    assert_eq!(o.recorder.builds(), 2);
    assert_eq!(o.controller.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn teardown_failure_is_reported_not_raised() {
    let o = observed(
        Plan {
            fail_destroy: true,
            ..Default::default()
        },
        ControllerConfig::default(),
    );
    o.controller.request_replacement();
    eventually(|| o.ready.get() == 1).await;

    o.controller.request_replacement();
    eventually(|| o.ready.get() == 2).await;
    assert_eq!(o.errors.kinds(), vec!["destroy"]);

    o.controller.destroy();
    assert_eq!(o.errors.kinds(), vec!["destroy", "destroy"]);
    assert_eq!(o.controller.state(), ConnectionState::Halted);
}

#[tokio::test]
async fn unobserved_errors_do_not_stop_recovery() {
    let (factory, recorder) = ScriptedFactory::new(Plan {
        reject_first: 3,
        ..Default::default()
    });
    let controller = ConnectionController::new(factory, ControllerConfig::default());

    controller.request_replacement();
    eventually(|| controller.is_ready()).await;

    assert_eq!(recorder.builds(), 4);
}

#[tokio::test]
async fn max_attempts_ends_round() {
    let o = observed(
        Plan {
            reject_first: usize::MAX,
            ..Default::default()
        },
        ControllerConfig::builder().max_attempts(3).build(),
    );

    o.controller.request_replacement();
    eventually(|| o.errors.count("attempts_exhausted") == 1).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(o.recorder.builds(), 3);
    assert_eq!(o.errors.count("construction"), 3);
    assert_eq!(o.controller.state(), ConnectionState::NoProxy);

    // The next send starts a fresh round.
    assert!(!o.controller.send(1));
    eventually(|| o.errors.count("attempts_exhausted") == 2).await;
    assert_eq!(o.recorder.builds(), 6);
}

#[tokio::test(start_paused = true)]
async fn backoff_spaces_failed_attempts() {
    let o = observed(
        Plan {
            reject_first: 2,
            ..Default::default()
        },
        ControllerConfig::builder()
            .policy(ReconnectPolicy::fixed(Duration::from_millis(100)))
            .build(),
    );

    let start = tokio::time::Instant::now();
    o.controller.request_replacement();
    eventually(|| o.ready.get() == 1).await;

    assert_eq!(o.recorder.builds(), 3);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn destroy_during_backoff_stops_retrying() {
    let o = observed(
        Plan {
            reject_first: usize::MAX,
            ..Default::default()
        },
        ControllerConfig::builder()
            .policy(ReconnectPolicy::fixed(Duration::from_secs(1)))
            .build(),
    );

    o.controller.request_replacement();
    eventually(|| o.recorder.builds() == 1).await;
    o.controller.destroy();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(o.recorder.builds(), 1);
    assert_eq!(o.controller.state(), ConnectionState::Halted);
}
