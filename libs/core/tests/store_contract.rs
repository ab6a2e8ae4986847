use gsm_core::{
    AttemptOutcome, ContactType, Direction, InMemoryMessageStore, InboundMessage, MessageFilter,
    MessageStatus, NewOutbound, SharedMessageStore, StatusUpdate, StoreError,
};

async fn outbound_lifecycle(store: SharedMessageStore) {
    let queued = store
        .queue_outbound(
            NewOutbound::new("smssync", ContactType::Sms, "+15550100", "hello").with_from("12345"),
        )
        .await
        .unwrap();
    assert_eq!(queued.status, MessageStatus::PendingPoll);
    assert_eq!(queued.direction, Direction::Outgoing);

    let claimed = store
        .claim(
            "smssync",
            None,
            MessageStatus::PendingPoll,
            StatusUpdate::Set(MessageStatus::Unknown),
        )
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, MessageStatus::Unknown);

    let sent = store
        .record_attempt(
            queued.id,
            MessageStatus::Unknown,
            AttemptOutcome::Sent {
                tracking_id: "sms-host-1-1".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.attempts, 1);

    let found = store
        .find_by_tracking_id("smssync", "sms-host-1-1")
        .await
        .unwrap();
    assert_eq!(found.id, queued.id);

    let err = store
        .transition(queued.id, MessageStatus::Sent, MessageStatus::PendingPoll)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let delivered = store
        .transition(queued.id, MessageStatus::Sent, MessageStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(delivered.status, MessageStatus::Delivered);

    let err = store
        .transition(queued.id, MessageStatus::Sent, MessageStatus::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let again = store
        .claim("smssync", None, MessageStatus::PendingPoll, StatusUpdate::default())
        .await
        .unwrap();
    assert!(again.is_empty());
}

async fn inbound_dedupe(store: SharedMessageStore) {
    let inbound = InboundMessage::new(ContactType::Twitter, "@alice", "hi")
        .with_provider_message_id("tweet-1");
    let stored = store
        .insert_inbound("twitter", inbound.clone())
        .await
        .unwrap();
    assert_eq!(stored.status, MessageStatus::Received);
    assert_eq!(stored.direction, Direction::Incoming);

    assert!(matches!(
        store.insert_inbound("twitter", inbound.clone()).await,
        Err(StoreError::Duplicate { .. })
    ));
    // The same remote id under another provider is a different message.
    store.insert_inbound("other", inbound).await.unwrap();

    let received = store
        .list(MessageFilter {
            status: Some(MessageStatus::Received),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(received.len(), 2);
    assert!(matches!(
        store.get(9_999).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn in_memory_store_follows_lifecycle() {
    outbound_lifecycle(InMemoryMessageStore::shared()).await;
    inbound_dedupe(InMemoryMessageStore::shared()).await;
}

#[cfg(feature = "store_sqlite")]
#[tokio::test]
async fn sqlite_store_follows_lifecycle() {
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    outbound_lifecycle(gsm_core::sqlite_store(dir.path().join("out.db")).unwrap()).await;
    let store = gsm_core::SqliteMessageStore::open_in_memory().unwrap();
    inbound_dedupe(Arc::new(store)).await;
}
