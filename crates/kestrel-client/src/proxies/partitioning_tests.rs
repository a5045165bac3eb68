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

struct Pools {
    default: InMemoryTransport,
    mail: InMemoryTransport,
    partitioning: Partitioning<Client>,
}

fn pools() -> Pools {
    let default = InMemoryTransport::new(1);
    let mail = InMemoryTransport::new(1);
    let partitioning = Partitioning::new(client(&default))
        .with_partition(["mail", "mail_errors"], client(&mail));
    Pools {
        default,
        mail,
        partitioning,
    }
}

#[tokio::test]
async fn test_mapped_keys_use_their_client() {
    let mut pools = pools();

    pools
        .partitioning
        .set("mail", Bytes::from_static(b"m"), 0)
        .await
        .unwrap();
    pools
        .partitioning
        .set("jobs", Bytes::from_static(b"j"), 0)
        .await
        .unwrap();

    assert_eq!(pools.mail.items(0, "mail").len(), 1);
    assert_eq!(pools.default.items(0, "jobs").len(), 1);
    assert!(pools.default.items(0, "mail").is_empty());
}

#[tokio::test]
async fn test_reads_follow_the_mapping() {
    let mut pools = pools();
    pools.mail.enqueue(0, "mail", "m");

    let value = QueueClient::get(&mut pools.partitioning, "mail", &ReadOptions::new())
        .await
        .unwrap();

    assert_eq!(value, Some(Bytes::from_static(b"m")));
    assert!(pools.default.calls().is_empty());
}

#[tokio::test]
async fn test_stats_merge_all_partitions() {
    let mut pools = pools();
    pools.mail.enqueue(0, "mail", "m");
    pools.default.enqueue(0, "jobs", "j");
    pools.default.enqueue(0, "jobs", "k");

    let stats = pools.partitioning.stats().await.unwrap();

    assert_eq!(stats.queue_names(), vec!["jobs", "mail"]);
    assert_eq!(stats.queue_size("jobs"), 2);
    assert_eq!(
        stats.stats.get("curr_items").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(pools.partitioning.clients().len(), 2);
}

#[tokio::test]
async fn test_stat_and_flush_are_routed() {
    let mut pools = pools();
    pools.mail.enqueue(0, "mail", "m");

    assert!(pools.partitioning.stat("mail").await.unwrap().is_some());
    assert_eq!(pools.partitioning.flush("mail").await.unwrap(), 1);
    pools.partitioning.delete("mail").await.unwrap();
    assert!(pools.default.calls().is_empty());
}
