//! Message store contract and the in-memory backend.
//!
//! Every write is conditional on the status the caller last observed, which is
//! what keeps two dispatch cycles from claiming or finishing the same message.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::errors::StoreError;
use crate::status::{MessageStatus, StatusUpdate};
use crate::types::{Direction, InboundMessage, Message, MessageId, NewOutbound};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Result of one send attempt, written back to a claimed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider accepted the message under `tracking_id`.
    Sent { tracking_id: String },
    /// Put the message back in `PendingPoll` for a later cycle.
    Requeue,
    /// Give up on the message.
    Failed,
}

impl AttemptOutcome {
    pub fn target_status(&self) -> MessageStatus {
        match self {
            AttemptOutcome::Sent { .. } => MessageStatus::Sent,
            AttemptOutcome::Requeue => MessageStatus::PendingPoll,
            AttemptOutcome::Failed => MessageStatus::Failed,
        }
    }
}

/// Filter for listing stored messages.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub provider: Option<String>,
    pub status: Option<MessageStatus>,
    pub direction: Option<Direction>,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Stores a new outbound message in `PendingPoll` or `Unknown`.
    async fn queue_outbound(&self, message: NewOutbound) -> Result<Message>;

    /// Stores an inbound message as `Received`, rejecting repeated provider message ids.
    async fn insert_inbound(&self, provider: &str, inbound: InboundMessage) -> Result<Message>;

    /// Atomically selects up to `limit` messages of `provider` in `current`
    /// (oldest first) and applies `update` to each of them.
    ///
    /// Not cancel-safe: a claim dropped after it committed leaves the selected
    /// messages in their new status without handing them to anyone.
    async fn claim(
        &self,
        provider: &str,
        limit: Option<usize>,
        current: MessageStatus,
        update: StatusUpdate,
    ) -> Result<Vec<Message>>;

    /// Records a send attempt on a message expected to be in `expected`.
    async fn record_attempt(
        &self,
        id: MessageId,
        expected: MessageStatus,
        outcome: AttemptOutcome,
    ) -> Result<Message>;

    /// Compare-and-swap status change.
    async fn transition(
        &self,
        id: MessageId,
        expected: MessageStatus,
        next: MessageStatus,
    ) -> Result<Message>;

    async fn get(&self, id: MessageId) -> Result<Message>;

    async fn find_by_tracking_id(&self, provider: &str, tracking_id: &str) -> Result<Message>;

    async fn list(&self, filter: MessageFilter) -> Result<Vec<Message>>;
}

pub type SharedMessageStore = Arc<dyn MessageStore>;

/// Checks an outcome against the status machine.
pub(crate) fn attempt_target(
    id: MessageId,
    expected: MessageStatus,
    outcome: &AttemptOutcome,
) -> Result<MessageStatus> {
    StatusUpdate::Set(outcome.target_status())
        .apply(expected)
        .map_err(|err| StoreError::transition(Some(id), err))
}

/// Validates a claim before anything is touched.
pub(crate) fn claim_target(current: MessageStatus, update: StatusUpdate) -> Result<MessageStatus> {
    update
        .apply(current)
        .map_err(|err| StoreError::transition(None, err))
}

#[cfg(feature = "store_sqlite")]
mod sqlite;
#[cfg(feature = "store_sqlite")]
pub use sqlite::{SqliteMessageStore, sqlite_store};

#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: MessageId,
    messages: BTreeMap<MessageId, Message>,
    inbound_keys: HashSet<(String, String)>,
    tracking: HashMap<(String, String), MessageId>,
}

impl Inner {
    fn allocate(&mut self) -> MessageId {
        self.next_id += 1;
        self.next_id
    }

    fn expect_status(&mut self, id: MessageId, expected: MessageStatus) -> Result<&mut Message> {
        let message = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if message.status != expected {
            return Err(StoreError::Conflict {
                id,
                expected,
                actual: message.status,
            });
        }
        Ok(message)
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedMessageStore {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn queue_outbound(&self, message: NewOutbound) -> Result<Message> {
        if !message.status.is_initial_outbound() {
            return Err(StoreError::InvalidTransition {
                id: None,
                from: MessageStatus::Unknown,
                to: message.status,
            });
        }
        let mut guard = self.inner.lock().await;
        let id = guard.allocate();
        let now = OffsetDateTime::now_utc();
        let stored = Message {
            id,
            provider: message.provider,
            direction: Direction::Outgoing,
            contact_type: message.contact_type,
            from: message.from,
            to: message.to,
            title: message.title,
            body: message.body,
            status: message.status,
            tracking_id: None,
            provider_message_id: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };
        guard.messages.insert(id, stored.clone());
        Ok(stored)
    }

    async fn insert_inbound(&self, provider: &str, inbound: InboundMessage) -> Result<Message> {
        let mut guard = self.inner.lock().await;
        if let Some(remote_id) = &inbound.provider_message_id {
            let key = (provider.to_string(), remote_id.clone());
            if guard.inbound_keys.contains(&key) {
                return Err(StoreError::Duplicate {
                    provider: key.0,
                    provider_message_id: key.1,
                });
            }
            guard.inbound_keys.insert(key);
        }
        let id = guard.allocate();
        let now = OffsetDateTime::now_utc();
        let stored = Message {
            id,
            provider: provider.to_string(),
            direction: Direction::Incoming,
            contact_type: inbound.contact_type,
            from: inbound.from,
            to: inbound.to.unwrap_or_default(),
            title: inbound.title,
            body: inbound.body,
            status: MessageStatus::Received,
            tracking_id: None,
            provider_message_id: inbound.provider_message_id,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };
        guard.messages.insert(id, stored.clone());
        Ok(stored)
    }

    async fn claim(
        &self,
        provider: &str,
        limit: Option<usize>,
        current: MessageStatus,
        update: StatusUpdate,
    ) -> Result<Vec<Message>> {
        let target = claim_target(current, update)?;
        let limit = limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut guard = self.inner.lock().await;
        let now = OffsetDateTime::now_utc();
        let mut claimed = Vec::new();
        for message in guard.messages.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if message.provider != provider
                || message.direction != Direction::Outgoing
                || message.status != current
            {
                continue;
            }
            if target != current {
                message.status = target;
                message.updated_at = now;
            }
            claimed.push(message.clone());
        }
        Ok(claimed)
    }

    async fn record_attempt(
        &self,
        id: MessageId,
        expected: MessageStatus,
        outcome: AttemptOutcome,
    ) -> Result<Message> {
        let target = attempt_target(id, expected, &outcome)?;
        let mut guard = self.inner.lock().await;
        let message = guard.expect_status(id, expected)?;
        message.status = target;
        message.attempts = message.attempts.saturating_add(1);
        message.updated_at = OffsetDateTime::now_utc();
        let mut tracking_key = None;
        if let AttemptOutcome::Sent { tracking_id } = outcome {
            tracking_key = Some((message.provider.clone(), tracking_id.clone()));
            message.tracking_id = Some(tracking_id);
        }
        let updated = message.clone();
        if let Some(key) = tracking_key {
            guard.tracking.insert(key, id);
        }
        Ok(updated)
    }

    async fn transition(
        &self,
        id: MessageId,
        expected: MessageStatus,
        next: MessageStatus,
    ) -> Result<Message> {
        let target = expected
            .transition(next)
            .map_err(|err| StoreError::transition(Some(id), err))?;
        let mut guard = self.inner.lock().await;
        let message = guard.expect_status(id, expected)?;
        message.status = target;
        message.updated_at = OffsetDateTime::now_utc();
        Ok(message.clone())
    }

    async fn get(&self, id: MessageId) -> Result<Message> {
        let guard = self.inner.lock().await;
        guard
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_by_tracking_id(&self, provider: &str, tracking_id: &str) -> Result<Message> {
        let guard = self.inner.lock().await;
        guard
            .tracking
            .get(&(provider.to_string(), tracking_id.to_string()))
            .and_then(|id| guard.messages.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tracking id {tracking_id}")))
    }

    async fn list(&self, filter: MessageFilter) -> Result<Vec<Message>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .messages
            .values()
            .filter(|m| filter.provider.as_deref().is_none_or(|p| m.provider == p))
            .filter(|m| filter.status.is_none_or(|s| m.status == s))
            .filter(|m| filter.direction.is_none_or(|d| m.direction == d))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
