use crate::common::{Errors, Plan, Recorder, ScriptedFactory, eventually};
use resilient_stream_reconnect::ConnectionState;
use resilient_stream_session::Session;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

fn session(plan: Plan) -> (Session<u32, u32>, Arc<Recorder>) {
    let (factory, recorder) = ScriptedFactory::new(plan);
    (Session::new(factory), recorder)
}

#[tokio::test]
async fn factory_waits_for_first_send() {
    let (session, recorder) = session(Plan::default());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(recorder.builds(), 0);
    assert!(session.is_empty());
    assert!(!session.is_ready());
    assert_eq!(session.state(), ConnectionState::NoProxy);

    session.send(1);
    eventually(|| session.is_empty()).await;
    assert_eq!(recorder.builds(), 1);
    assert!(session.is_ready());
}

#[tokio::test]
async fn send_after_destroy_is_refused() {
    let (session, recorder) = session(Plan::default());
    session.send(1);
    eventually(|| session.is_empty()).await;

    session.destroy();
    assert!(!session.send(2));
    assert!(session.is_empty());
    assert_eq!(recorder.accepted(), vec![1]);
}

#[tokio::test]
async fn destroy_drops_buffered_items() {
    let (session, recorder) = session(Plan {
        build_delay: Some(Duration::from_millis(20)),
        ..Default::default()
    });

    for n in 0..5 {
        session.send(n);
    }
    assert_eq!(session.len(), 5);

    session.destroy();
    assert!(session.is_empty());
    assert_eq!(session.state(), ConnectionState::Halted);

    // The attempt in flight still completes, and its proxy is discarded.
    eventually(|| recorder.destroys() == 1).await;
    assert!(recorder.attempts().is_empty());
}

#[tokio::test]
async fn destroy_twice_matches_destroy_once() {
    let (session, recorder) = session(Plan::default());
    let errors = Errors::default();
    session.on_error(errors.handler());
    session.send(1);
    eventually(|| session.is_empty()).await;

    session.destroy();
    session.destroy();

    assert_eq!(recorder.destroys(), 1);
    assert!(errors.kinds().is_empty());
    assert_eq!(session.state(), ConnectionState::Halted);
}

#[tokio::test]
async fn dropping_session_destroys_proxy() {
    let (session, recorder) = session(Plan::default());
    session.send(1);
    eventually(|| session.is_empty()).await;

    drop(session);
    assert_eq!(recorder.destroys(), 1);
}

#[tokio::test]
async fn exhausted_attempts_keep_items_for_next_round() {
    let (factory, recorder) = ScriptedFactory::new(Plan {
        reject_first: 4,
        ..Default::default()
    });
    let session = Session::builder().max_attempts(3).build(factory);
    let errors = Errors::default();
    session.on_error(errors.handler());

    session.send(1);
    session.send(2);
    eventually(|| errors.count("attempts_exhausted") == 1).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.len(), 2);
    assert_eq!(recorder.builds(), 3);
    assert_eq!(session.state(), ConnectionState::NoProxy);

    // A plain send starts the next round; the fourth rejection is followed by success.
    session.send(3);
    eventually(|| session.is_empty()).await;
    assert_eq!(recorder.accepted(), vec![1, 2, 3]);
    assert_eq!(recorder.builds(), 5);
}

#[tokio::test]
async fn error_handler_can_destroy_session() {
    let (session, recorder) = session(Plan {
        fail_on: Some(1),
        ..Default::default()
    });
    let session = Arc::new(session);

    let weak: Weak<Session<u32, u32>> = Arc::downgrade(&session);
    session.on_error(move |_| {
        if let Some(session) = weak.upgrade() {
            session.destroy();
        }
    });

    session.send(1);
    session.send(2);
    eventually(|| session.state() == ConnectionState::Halted).await;

    assert!(session.is_empty());
    assert_eq!(recorder.attempts(), vec![1]);
    assert_eq!(recorder.destroys(), 1);
}

#[tokio::test]
async fn send_after_exhaustion_restarts_without_explicit_request() {
    let (factory, recorder) = ScriptedFactory::new(Plan {
        reject_first: 3,
        ..Default::default()
    });
    let session = Session::builder().max_attempts(3).build(factory);
    let errors = Errors::default();
    session.on_error(errors.handler());

    session.send(1);
    eventually(|| errors.count("attempts_exhausted") == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.builds(), 3);
    assert_eq!(session.state(), ConnectionState::NoProxy);

    session.send(2);
    eventually(|| session.is_empty()).await;
    assert_eq!(recorder.builds(), 4);
    assert_eq!(recorder.accepted(), vec![1, 2]);
    assert!(session.is_ready());
}

#[tokio::test]
async fn send_from_error_handler_does_not_reoffer_to_failing_proxy() {
    let (session, recorder) = session(Plan {
        fail_on: Some(2),
        failing_proxies: Some(1),
        ..Default::default()
    });
    let session = Arc::new(session);
    let errors = Errors::default();
    session.on_error(errors.handler());

    let weak: Weak<Session<u32, u32>> = Arc::downgrade(&session);
    let sent = AtomicBool::new(false);
    session.on_error(move |_| {
        if !sent.swap(true, Ordering::SeqCst) {
            if let Some(session) = weak.upgrade() {
                session.send(100);
            }
        }
    });

    session.send(1);
    eventually(|| session.is_empty()).await;
    session.send(2);
    eventually(|| session.is_empty() && recorder.builds() == 2).await;

    assert_eq!(errors.count("send"), 1);
    assert_eq!(recorder.accepted_by(0), vec![1]);
    assert_eq!(recorder.accepted_by(1), vec![2, 100]);
    assert_eq!(recorder.attempts(), vec![1, 2, 2, 100]);
}
