//! Tests for the queue service.

use super::*;
use crate::platform::sql::SqlService;
use anyhow::Result;
use std::time::Duration;
use tempfile::TempDir;

fn quick_config() -> QueueConfig {
    QueueConfig {
        wait_time: Duration::from_millis(50),
        visibility_timeout: Duration::from_secs(60),
        max_queue_size: None,
    }
}

fn backends() -> Result<Vec<(&'static str, QueueService)>> {
    Ok(vec![
        ("memory", QueueService::memory(quick_config())),
        ("sqlite", QueueService::sqlite(SqlService::memory()?, quick_config())),
    ])
}

#[tokio::test]
async fn test_send_receive_fifo() -> Result<()> {
    for (name, service) in backends()? {
        let id1 = service.send("q", "one", Attributes::new()).await?;
        let id2 = service.send("q", "two", Attributes::new()).await?;
        assert_ne!(id1, id2, "{name}");

        let first = service.receive("q").await?.expect("first message");
        assert_eq!(first.id, id1, "{name}");
        assert_eq!(first.body, "one", "{name}");
        assert_eq!(first.receive_count, 1, "{name}");

        let second = service.receive("q").await?.expect("second message");
        assert_eq!(second.body, "two", "{name}");

        assert!(service.receive("q").await?.is_none(), "{name}");
        assert_eq!(service.len("q").await?, 2, "{name}: in-flight messages still count");
    }
    Ok(())
}

#[tokio::test]
async fn test_delete_acknowledges() -> Result<()> {
    for (name, service) in backends()? {
        service.send("q", "body", Attributes::new()).await?;
        let msg = service.receive("q").await?.expect("message");

        assert!(service.delete("q", &msg.receipt_handle).await?, "{name}");
        assert!(!service.delete("q", &msg.receipt_handle).await?, "{name}");
        assert!(service.is_empty("q").await?, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_unacknowledged_message_is_redelivered() -> Result<()> {
    let config = QueueConfig {
        visibility_timeout: Duration::from_millis(20),
        ..quick_config()
    };
    let services = vec![
        QueueService::memory(config.clone()),
        QueueService::sqlite(SqlService::memory()?, config),
    ];

    for service in services {
        service.send("q", "retry me", Attributes::new()).await?;
        let first = service.receive("q").await?.expect("first delivery");

        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = service
            .receive_timeout("q", Duration::from_millis(200))
            .await?
            .expect("redelivery");
        assert_eq!(second.id, first.id);
        assert_eq!(second.receive_count, 2);
        assert_ne!(second.receipt_handle, first.receipt_handle);

        // The stale handle no longer acknowledges.
        assert!(!service.delete("q", &first.receipt_handle).await?);
        assert!(service.delete("q", &second.receipt_handle).await?);
    }
    Ok(())
}

#[tokio::test]
async fn test_attributes_survive() -> Result<()> {
    for (name, service) in backends()? {
        let mut attrs = Attributes::new();
        attrs.insert("SentAt".into(), "2016-01-01 00:00:00 +0000 UTC".into());
        service.send("q", "{}", attrs.clone()).await?;

        let msg = service.receive("q").await?.expect("message");
        assert_eq!(msg.attributes, attrs, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_queues_are_isolated() -> Result<()> {
    for (name, service) in backends()? {
        service.send("a", "for a", Attributes::new()).await?;
        assert!(service.receive("b").await?.is_none(), "{name}");
        assert_eq!(service.len("a").await?, 1, "{name}");
        assert_eq!(service.len("b").await?, 0, "{name}");
    }
    Ok(())
}

#[tokio::test]
async fn test_max_queue_size() -> Result<()> {
    let service = QueueService::memory(QueueConfig {
        max_queue_size: Some(1),
        ..quick_config()
    });

    service.send("q", "one", Attributes::new()).await?;
    assert!(service.send("q", "two", Attributes::new()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_long_poll_wakes_on_send() -> Result<()> {
    let service = QueueService::memory(QueueConfig {
        wait_time: Duration::from_secs(5),
        ..quick_config()
    });

    let receiver = service.clone();
    let handle = tokio::spawn(async move { receiver.receive("q").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    service.send("q", "wake", Attributes::new()).await?;

    let msg = tokio::time::timeout(Duration::from_secs(2), handle).await???;
    assert_eq!(msg.map(|m| m.body).as_deref(), Some("wake"));
    Ok(())
}

#[tokio::test]
async fn test_sqlite_queue_shared_between_services() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("queue.db");

    let producer = QueueService::sqlite(SqlService::file(&path)?, quick_config());
    let consumer = QueueService::sqlite(SqlService::file(&path)?, quick_config());

    producer.send("q", "across", Attributes::new()).await?;

    let msg = consumer.receive("q").await?.expect("message");
    assert_eq!(msg.body, "across");
    assert!(producer.receive("q").await?.is_none());
    assert!(consumer.delete("q", &msg.receipt_handle).await?);
    assert_eq!(producer.len("q").await?, 0);
    Ok(())
}
