//! End-to-end tests of transactional job delivery over TCP.

mod common;

use bytes::Bytes;
use common::{connect, FakeKestrelServer};
use kestrel_client::{
    Blocking, QueueError, ReadOptions, RetryableJob, ScriptedRandom, Transactional, WaitPolicy,
};
use std::time::Duration;

/// Random draw that reads the primary queue before the error queue
const PRIMARY_FIRST: f64 = 0.5;

fn transactional(server: &FakeKestrelServer) -> Transactional {
    Transactional::new(connect(&[server]))
        .with_random(Box::new(ScriptedRandom::constant(PRIMARY_FIRST)))
}

#[tokio::test]
async fn test_failed_job_moves_to_error_queue() {
    let server = FakeKestrelServer::start().await;
    let job = RetryableJob::with_retries(1, Bytes::from_static(b"send mail"));
    server
        .backend()
        .enqueue(0, "Q_errors", job.encode().unwrap());
    let mut queue = transactional(&server);

    let payload = queue.get("Q", &ReadOptions::new()).await.unwrap();

    assert_eq!(payload, Some(Bytes::from_static(b"send mail")));
    assert_eq!(queue.current_try(), 2);
    assert_eq!(queue.last_read_queue(), Some("Q_errors"));

    assert!(queue.retry(None).await.unwrap());

    let requeued = server.backend().items(0, "Q_errors");
    assert_eq!(requeued.len(), 1);
    let next = RetryableJob::decode(requeued[0].clone());
    assert_eq!(next.retries(), 2);
    assert_eq!(next.payload(), &Bytes::from_static(b"send mail"));

    assert!(server.backend().open_item(0, "Q_errors").is_none());
    let keys: Vec<String> = server
        .backend()
        .calls()
        .into_iter()
        .map(|call| call.key)
        .collect();
    assert_eq!(
        keys,
        vec!["Q/open", "Q_errors/open", "Q_errors", "Q_errors/close"]
    );
}

#[tokio::test]
async fn test_next_get_acknowledges_previous_job() {
    let server = FakeKestrelServer::start().await;
    server.backend().enqueue(0, "Q", "first");
    server.backend().enqueue(0, "Q", "second");
    let mut queue = transactional(&server);

    queue.get("Q", &ReadOptions::new()).await.unwrap();
    assert_eq!(
        server.backend().open_item(0, "Q"),
        Some(Bytes::from_static(b"first"))
    );

    let second = queue.get("Q", &ReadOptions::new()).await.unwrap();

    assert_eq!(second, Some(Bytes::from_static(b"second")));
    assert_eq!(
        server.backend().open_item(0, "Q"),
        Some(Bytes::from_static(b"second"))
    );
    assert!(server.backend().items(0, "Q").is_empty());

    assert!(queue.commit().await.unwrap());
    assert!(server.backend().open_item(0, "Q").is_none());
}

#[tokio::test]
async fn test_abort_returns_job_to_queue() {
    let server = FakeKestrelServer::start().await;
    server.backend().enqueue(0, "Q", "job");
    let mut queue = transactional(&server);

    queue.get("Q", &ReadOptions::new()).await.unwrap();
    assert!(queue.abort().await.unwrap());

    assert!(server.backend().open_item(0, "Q").is_none());
    assert_eq!(
        server.backend().items(0, "Q"),
        vec![Bytes::from_static(b"job")]
    );
    assert_eq!(queue.current_queue(), None);
}

#[tokio::test]
async fn test_second_queue_is_refused_while_job_is_open() {
    let server = FakeKestrelServer::start().await;
    server.backend().enqueue(0, "Q", "job");
    let mut queue = transactional(&server);

    queue.get("Q", &ReadOptions::new()).await.unwrap();
    let calls_before = server.backend().calls().len();

    let result = queue.get("other", &ReadOptions::new()).await;

    assert!(matches!(result, Err(QueueError::MultipleQueues { .. })));
    assert_eq!(server.backend().calls().len(), calls_before);
}

#[tokio::test]
async fn test_blocking_transactional_read_waits_for_producer() {
    let server = FakeKestrelServer::start().await;
    let mut blocking = Blocking::with_policy(
        transactional(&server),
        WaitPolicy::Fixed(Duration::from_millis(20)),
    );

    let producer = server.backend().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.enqueue(0, "Q", "late job");
    });

    let value = tokio::time::timeout(
        Duration::from_secs(5),
        blocking.get("Q", &ReadOptions::new()),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(value, Bytes::from_static(b"late job"));
    assert_eq!(blocking.inner().current_queue(), Some("Q"));
}
