use super::*;
use crate::config::ClientConfig;
use crate::random::ScriptedRandom;
use crate::transports::memory::InMemoryTransport;
use std::sync::Arc;

fn client(transport: &InMemoryTransport) -> Client {
    let config = ClientConfig {
        no_wait: true,
        ..ClientConfig::new(vec!["memory".to_string()])
    };
    Client::new(Arc::new(transport.clone()), &config)
        .with_random(Box::new(ScriptedRandom::constant(0.0)))
}

#[test]
fn test_namespaced_and_in_namespace() {
    let ns = Namespace::new("reports", ());

    assert_eq!(ns.namespaced("daily"), "reports:daily");
    assert_eq!(ns.in_namespace("reports:daily"), Some("daily"));
    assert_eq!(ns.in_namespace("reports:"), None);
    assert_eq!(ns.in_namespace("reportsdaily"), None);
    assert_eq!(ns.in_namespace("other:daily"), None);
}

#[test]
fn test_filter_queues() {
    let ns = Namespace::new("a", ());
    let queues = ["a:one", "b:two", "a:three", "plain"];

    assert_eq!(ns.filter_queues(&queues), vec!["one", "three"]);
}

#[tokio::test]
async fn test_operations_use_prefixed_keys() {
    let transport = InMemoryTransport::new(1);
    let mut ns = Namespace::new("reports", client(&transport));

    assert!(ns.set("daily", Bytes::from_static(b"x"), 0).await.unwrap());
    assert_eq!(transport.items(0, "reports:daily").len(), 1);
    assert!(ns.stat("daily").await.unwrap().is_some());

    let value = QueueClient::get(&mut ns, "daily", &ReadOptions::new())
        .await
        .unwrap();
    assert_eq!(value, Some(Bytes::from_static(b"x")));

    transport.enqueue(0, "reports:daily", "y");
    assert_eq!(ns.flush("daily").await.unwrap(), 1);

    ns.delete("daily").await.unwrap();
    assert!(transport
        .calls()
        .iter()
        .all(|call| call.key.is_empty() || call.key.starts_with("reports:daily")));
}

#[tokio::test]
async fn test_available_queues_are_filtered() {
    let transport = InMemoryTransport::new(1);
    transport.enqueue(0, "reports:daily", "x");
    transport.enqueue(0, "reports:weekly", "x");
    transport.enqueue(0, "jobs", "x");
    let mut ns = Namespace::new("reports", client(&transport));

    assert_eq!(
        ns.available_queues().await.unwrap(),
        vec!["daily".to_string(), "weekly".to_string()]
    );
}
