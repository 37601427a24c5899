//! Domain-level tests for the queue manager over the in-memory store.
//! No server, no Redis: these pin down the storage semantics, boundaries,
//! and idempotence rules directly.

use std::sync::Arc;

use veil_relay::error::RelayError;
use veil_relay::queue::{
    QueueManager, DEFAULT_WINDOW_LIMIT, MAX_MESSAGE_BYTES, MAX_QUEUE_DEPTH,
};
use veil_relay::store::{keys, MemoryStore, Store};

fn fixture() -> (QueueManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (QueueManager::new(store.clone()), store)
}

#[tokio::test]
async fn create_then_send_then_poll_roundtrip() {
    let (manager, _) = fixture();

    let created = manager.create_queue().await.unwrap();
    assert_eq!(created.queue_id.len(), 64);
    assert_eq!(created.access_token.len(), 64);
    assert_eq!(created.queue_url, format!("/queue/{}", created.queue_id));

    let receipt = manager
        .append(&created.queue_id, vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(receipt.message_id.len(), 32);

    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 1);
    assert_eq!(window.messages[0].payload, vec![1, 2, 3]);
    assert_eq!(window.messages[0].id, receipt.message_id);
    assert_eq!(window.messages[0].queue_id, created.queue_id);
    assert!(!window.has_more);
}

#[tokio::test]
async fn message_expiry_is_received_at_plus_ttl() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();
    manager.append(&created.queue_id, vec![0]).await.unwrap();

    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    let message = &window.messages[0];
    assert_eq!(
        (message.expires_at - message.received_at).num_seconds(),
        24 * 60 * 60
    );
}

#[tokio::test]
async fn token_of_another_queue_is_rejected() {
    let (manager, _) = fixture();

    let queue_a = manager.create_queue().await.unwrap();
    let queue_b = manager.create_queue().await.unwrap();

    let result = manager
        .window(&queue_a.queue_id, &queue_b.access_token, None, None)
        .await;
    assert!(matches!(result, Err(RelayError::InvalidAccessToken)));
}

#[tokio::test]
async fn missing_queue_is_not_found() {
    let (manager, _) = fixture();

    let result = manager.append("no-such-queue", vec![1]).await;
    assert!(matches!(result, Err(RelayError::QueueNotFound)));
}

#[tokio::test]
async fn payload_size_boundary() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    // Exactly at the limit is accepted
    manager
        .append(&created.queue_id, vec![0u8; MAX_MESSAGE_BYTES])
        .await
        .unwrap();

    // One byte over is rejected
    let result = manager
        .append(&created.queue_id, vec![0u8; MAX_MESSAGE_BYTES + 1])
        .await;
    assert!(matches!(result, Err(RelayError::MessageTooLarge)));
}

#[tokio::test]
async fn queue_depth_boundary() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    for _ in 0..MAX_QUEUE_DEPTH {
        manager.append(&created.queue_id, vec![1]).await.unwrap();
    }

    let result = manager.append(&created.queue_id, vec![1]).await;
    assert!(matches!(result, Err(RelayError::QueueFull)));
}

#[tokio::test]
async fn window_limit_defaults_and_caps() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    for _ in 0..DEFAULT_WINDOW_LIMIT + 50 {
        manager.append(&created.queue_id, vec![1]).await.unwrap();
    }

    // No limit: default applies, more remains
    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    assert_eq!(window.messages.len(), DEFAULT_WINDOW_LIMIT);
    assert!(window.has_more);

    // Zero means default
    let window = manager
        .window(&created.queue_id, &created.access_token, None, Some(0))
        .await
        .unwrap();
    assert_eq!(window.messages.len(), DEFAULT_WINDOW_LIMIT);

    // Oversized limits are capped
    let window = manager
        .window(&created.queue_id, &created.access_token, None, Some(5000))
        .await
        .unwrap();
    assert_eq!(window.messages.len(), DEFAULT_WINDOW_LIMIT);

    // A small limit is honored
    let window = manager
        .window(&created.queue_id, &created.access_token, None, Some(10))
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 10);
    assert!(window.has_more);
}

#[tokio::test]
async fn since_resumes_after_the_given_id() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    let m1 = manager.append(&created.queue_id, vec![1]).await.unwrap();
    let m2 = manager.append(&created.queue_id, vec![2]).await.unwrap();
    let m3 = manager.append(&created.queue_id, vec![3]).await.unwrap();

    let window = manager
        .window(
            &created.queue_id,
            &created.access_token,
            Some(&m2.message_id),
            None,
        )
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 1);
    assert_eq!(window.messages[0].id, m3.message_id);
    assert!(!window.has_more);

    // Arrival order is delivery order
    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    let ids: Vec<_> = window.messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, vec![m1.message_id, m2.message_id, m3.message_id]);
}

#[tokio::test]
async fn unknown_since_degrades_to_full_window() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    for payload in [vec![1], vec![2], vec![3]] {
        manager.append(&created.queue_id, payload).await.unwrap();
    }

    let window = manager
        .window(
            &created.queue_id,
            &created.access_token,
            Some("0000000000000000000000000000dead"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 3);
}

#[tokio::test]
async fn since_last_id_yields_empty_window() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    let last = manager.append(&created.queue_id, vec![1]).await.unwrap();

    for _ in 0..2 {
        let window = manager
            .window(
                &created.queue_id,
                &created.access_token,
                Some(&last.message_id),
                None,
            )
            .await
            .unwrap();
        assert!(window.messages.is_empty());
        assert!(!window.has_more);
    }
}

#[tokio::test]
async fn acknowledge_removes_and_is_idempotent() {
    let (manager, store) = fixture();
    let created = manager.create_queue().await.unwrap();

    let receipt = manager.append(&created.queue_id, vec![1]).await.unwrap();

    manager
        .acknowledge(&created.queue_id, &receipt.message_id, &created.access_token)
        .await
        .unwrap();

    // Second acknowledgement of the same id is a no-op success
    manager
        .acknowledge(&created.queue_id, &receipt.message_id, &created.access_token)
        .await
        .unwrap();

    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    assert!(window.messages.is_empty());

    let list = store
        .list_range(&keys::message_list(&created.queue_id))
        .await
        .unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn acknowledge_requires_the_right_token() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();
    let receipt = manager.append(&created.queue_id, vec![1]).await.unwrap();

    let result = manager
        .acknowledge(&created.queue_id, &receipt.message_id, "wrong-token")
        .await;
    assert!(matches!(result, Err(RelayError::InvalidAccessToken)));
}

#[tokio::test]
async fn delete_cascades_and_revokes_the_token() {
    let (manager, store) = fixture();
    let created = manager.create_queue().await.unwrap();

    let receipt = manager.append(&created.queue_id, vec![1]).await.unwrap();

    manager
        .delete_queue(&created.queue_id, &created.access_token)
        .await
        .unwrap();

    // Every key under the handle is gone
    assert_eq!(
        store.get(&keys::queue(&created.queue_id)).await.unwrap(),
        None
    );
    assert_eq!(
        store
            .get(&keys::message(&created.queue_id, &receipt.message_id))
            .await
            .unwrap(),
        None
    );
    assert!(store
        .list_range(&keys::message_list(&created.queue_id))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store.get(&keys::token(&created.access_token)).await.unwrap(),
        None
    );

    // Subsequent reads see a missing queue
    let result = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await;
    assert!(matches!(result, Err(RelayError::QueueNotFound)));

    // And the token authorizes nothing anymore
    let result = manager
        .authorize(&created.queue_id, &created.access_token)
        .await;
    assert!(matches!(result, Err(RelayError::InvalidAccessToken)));
}

#[tokio::test]
async fn delete_requires_the_right_token() {
    let (manager, _) = fixture();
    let created = manager.create_queue().await.unwrap();

    let result = manager.delete_queue(&created.queue_id, "wrong-token").await;
    assert!(matches!(result, Err(RelayError::InvalidAccessToken)));
}

#[tokio::test]
async fn handles_and_tokens_are_distinct() {
    let (manager, _) = fixture();

    let mut handles = std::collections::HashSet::new();
    let mut tokens = std::collections::HashSet::new();
    for _ in 0..32 {
        let created = manager.create_queue().await.unwrap();
        assert!(handles.insert(created.queue_id));
        assert!(tokens.insert(created.access_token));
    }
}

#[tokio::test]
async fn expired_message_record_is_pruned_from_the_list() {
    let (manager, store) = fixture();
    let created = manager.create_queue().await.unwrap();

    let m1 = manager.append(&created.queue_id, vec![1]).await.unwrap();
    let m2 = manager.append(&created.queue_id, vec![2]).await.unwrap();

    // Simulate the record expiring out from under the list
    store
        .delete(&keys::message(&created.queue_id, &m1.message_id))
        .await
        .unwrap();

    let window = manager
        .window(&created.queue_id, &created.access_token, None, None)
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 1);
    assert_eq!(window.messages[0].id, m2.message_id);

    // The dangling id was dropped during the read
    let list = store
        .list_range(&keys::message_list(&created.queue_id))
        .await
        .unwrap();
    assert_eq!(list, vec![m2.message_id]);
}

#[tokio::test]
async fn trailing_expired_ids_do_not_report_more() {
    let (manager, store) = fixture();
    let created = manager.create_queue().await.unwrap();

    let mut receipts = Vec::new();
    for payload in [vec![1], vec![2], vec![3], vec![4]] {
        receipts.push(manager.append(&created.queue_id, payload).await.unwrap());
    }

    // Only ids past the limit are left dangling
    store
        .delete(&keys::message(&created.queue_id, &receipts[3].message_id))
        .await
        .unwrap();

    let window = manager
        .window(&created.queue_id, &created.access_token, None, Some(3))
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 3);
    assert!(!window.has_more, "a drained queue must not promise more");

    // The dangling id was pruned while probing for more
    let list = store
        .list_range(&keys::message_list(&created.queue_id))
        .await
        .unwrap();
    assert_eq!(list.len(), 3);

    // A live record past the limit still reports more
    manager.append(&created.queue_id, vec![5]).await.unwrap();
    let window = manager
        .window(&created.queue_id, &created.access_token, None, Some(3))
        .await
        .unwrap();
    assert_eq!(window.messages.len(), 3);
    assert!(window.has_more);
}

#[tokio::test]
async fn housekeep_reports_memory_evictions() {
    use std::time::Duration;

    let (manager, store) = fixture();
    store
        .set_with_ttl("stray", "v", Duration::from_millis(5))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(manager.housekeep().await, 1);
    assert_eq!(manager.housekeep().await, 0);
}
