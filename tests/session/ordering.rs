use crate::common::{Counter, Errors, Plan, Recorder, ScriptedFactory, eventually};
use resilient_stream_session::Session;
use std::sync::{Arc, Weak};
use std::time::Duration;

fn session(plan: Plan) -> (Session<u32, u32>, Arc<Recorder>) {
    let (factory, recorder) = ScriptedFactory::new(plan);
    (Session::builder().name("ordering").build(factory), recorder)
}

#[tokio::test]
async fn items_sent_before_ready_arrive_in_order() {
    let (session, recorder) = session(Plan::default());
    let ready = Counter::default();
    session.on_ready(ready.handler());

    for n in 1..=3 {
        assert!(session.send(n));
    }
    assert_eq!(session.len(), 3);
    assert!(recorder.accepted().is_empty());

    eventually(|| session.is_empty()).await;
    assert_eq!(ready.get(), 1);
    assert_eq!(recorder.accepted(), vec![1, 2, 3]);
}

#[tokio::test]
async fn rejected_item_is_retried_first_on_next_proxy() {
    let (session, recorder) = session(Plan {
        fail_on: Some(2),
        failing_proxies: Some(1),
        ..Default::default()
    });
    let errors = Errors::default();
    session.on_error(errors.handler());

    for n in 1..=3 {
        session.send(n);
    }
    eventually(|| session.is_empty()).await;

    assert_eq!(recorder.attempts(), vec![1, 2, 2, 3]);
    assert_eq!(recorder.accepted_by(0), vec![1]);
    assert_eq!(recorder.accepted_by(1), vec![2, 3]);
    assert_eq!(errors.kinds(), vec!["send"]);
    assert_eq!(recorder.builds(), 2);
}

#[tokio::test]
async fn order_holds_across_many_replacements() {
    let (session, recorder) = session(Plan {
        fail_on: Some(3),
        ..Default::default()
    });
    session.on_error(|_| {});

    for n in 0..40 {
        session.send(n);
        if n % 7 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    eventually(|| session.is_empty()).await;

    assert_eq!(recorder.accepted(), (0..40).collect::<Vec<_>>());
    assert!(recorder.builds() > 1);
}

#[tokio::test]
async fn construction_failures_keep_buffer_intact() {
    let (session, recorder) = session(Plan {
        reject_first: 2,
        ..Default::default()
    });
    let errors = Errors::default();
    session.on_error(errors.handler());

    session.send(10);
    session.send(11);
    eventually(|| session.is_empty()).await;

    assert_eq!(recorder.builds(), 3);
    assert_eq!(errors.kinds(), vec!["construction", "construction"]);
    assert_eq!(recorder.accepted(), vec![10, 11]);
}

#[tokio::test]
async fn data_handler_can_send_reentrantly() {
    let (session, recorder) = session(Plan::default());
    let session = Arc::new(session);

    let weak: Weak<Session<u32, u32>> = Arc::downgrade(&session);
    session.on_data(move |echo: &u32| {
        if *echo < 100 {
            if let Some(session) = weak.upgrade() {
                session.send(echo + 100);
            }
        }
    });

    session.send(1);
    session.send(2);
    eventually(|| session.is_empty() && recorder.accepted().len() == 4).await;

    assert_eq!(recorder.accepted(), vec![1, 2, 101, 102]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_keep_their_own_order() {
    let (session, recorder) = session(Plan {
        fail_on: Some(5),
        ..Default::default()
    });
    session.on_error(|_| {});
    let session = Arc::new(session);

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                for seq in 0..50 {
                    session.send(producer * 1000 + seq);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    eventually(|| session.is_empty()).await;

    let accepted = recorder.accepted();
    assert_eq!(accepted.len(), 200);
    for producer in 0..4u32 {
        let own: Vec<u32> = accepted
            .iter()
            .copied()
            .filter(|item| item / 1000 == producer)
            .collect();
        assert_eq!(own, (0..50).map(|seq| producer * 1000 + seq).collect::<Vec<_>>());
    }
}
