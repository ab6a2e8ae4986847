use std::{
    path::Path,
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use rusqlite::{
    Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params,
    params_from_iter, types::Type,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::task::spawn_blocking;

use super::{
    AttemptOutcome, MessageFilter, MessageStore, SharedMessageStore, attempt_target, claim_target,
};
use crate::errors::StoreError;
use crate::status::{MessageStatus, StatusUpdate};
use crate::types::{Direction, InboundMessage, Message, MessageId, NewOutbound};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    direction TEXT NOT NULL,
    contact_type TEXT NOT NULL,
    from_addr TEXT NOT NULL,
    to_addr TEXT NOT NULL,
    title TEXT,
    body TEXT NOT NULL,
    status TEXT NOT NULL,
    tracking_id TEXT,
    provider_message_id TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS messages_inbound_key
    ON messages (provider, provider_message_id)
    WHERE provider_message_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS messages_pending
    ON messages (provider, direction, status, id);
CREATE INDEX IF NOT EXISTS messages_tracking
    ON messages (provider, tracking_id);
"#;

const SELECT_COLUMNS: &str = "id, provider, direction, contact_type, from_addr, to_addr, title, \
     body, status, tracking_id, provider_message_id, attempts, created_at, updated_at";

/// SQLite-backed store. Claims run inside `IMMEDIATE` transactions so that
/// processes sharing the database file serialize their read-then-write.
#[derive(Clone)]
pub struct SqliteMessageStore {
    conn: Arc<StdMutex<Connection>>,
}

pub fn sqlite_store(path: impl AsRef<Path>) -> anyhow::Result<SharedMessageStore> {
    Ok(Arc::new(SqliteMessageStore::open(path)?))
}

impl SqliteMessageStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    async fn with_tx<F, T>(&self, func: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Internal(anyhow::anyhow!("sqlite connection poisoned")))?;
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(internal)?;
            let value = func(&tx)?;
            tx.commit().map_err(internal)?;
            Ok(value)
        })
        .await
        .map_err(|err| StoreError::Internal(err.into()))?
    }
}

fn internal(err: rusqlite::Error) -> StoreError {
    StoreError::Internal(err.into())
}

fn now_text() -> Result<String, StoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| StoreError::Internal(err.into()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|err| conversion_error(idx, err))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let raw: String = row.get(idx)?;
    OffsetDateTime::parse(&raw, &Rfc3339).map_err(|err| conversion_error(idx, err.to_string()))
}

fn parse_direction(row: &Row<'_>, idx: usize) -> rusqlite::Result<Direction> {
    let raw: String = row.get(idx)?;
    match raw.as_str() {
        "incoming" => Ok(Direction::Incoming),
        "outgoing" => Ok(Direction::Outgoing),
        other => Err(conversion_error(idx, format!("unknown direction `{other}`"))),
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let attempts: i64 = row.get(11)?;
    Ok(Message {
        id: id.max(0) as MessageId,
        provider: row.get(1)?,
        direction: parse_direction(row, 2)?,
        contact_type: parse_column(row, 3)?,
        from: row.get(4)?,
        to: row.get(5)?,
        title: row.get(6)?,
        body: row.get(7)?,
        status: parse_column(row, 8)?,
        tracking_id: row.get(9)?,
        provider_message_id: row.get(10)?,
        attempts: attempts.clamp(0, u32::MAX as i64) as u32,
        created_at: parse_time(row, 12)?,
        updated_at: parse_time(row, 13)?,
    })
}

fn load(tx: &Transaction<'_>, id: MessageId) -> Result<Message, StoreError> {
    tx.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM messages WHERE id = ?1"),
        params![id as i64],
        row_to_message,
    )
    .optional()
    .map_err(internal)?
    .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn load_expecting(
    tx: &Transaction<'_>,
    id: MessageId,
    expected: MessageStatus,
) -> Result<Message, StoreError> {
    let message = load(tx, id)?;
    if message.status != expected {
        return Err(StoreError::Conflict {
            id,
            expected,
            actual: message.status,
        });
    }
    Ok(message)
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn queue_outbound(&self, message: NewOutbound) -> Result<Message, StoreError> {
        if !message.status.is_initial_outbound() {
            return Err(StoreError::InvalidTransition {
                id: None,
                from: MessageStatus::Unknown,
                to: message.status,
            });
        }
        self.with_tx(move |tx| {
            let now = now_text()?;
            tx.execute(
                "INSERT INTO messages (provider, direction, contact_type, from_addr, to_addr, title,
                 body, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
                params![
                    message.provider,
                    Direction::Outgoing.as_str(),
                    message.contact_type.as_str(),
                    message.from,
                    message.to,
                    message.title,
                    message.body,
                    message.status.as_str(),
                    now,
                ],
            )
            .map_err(internal)?;
            load(tx, tx.last_insert_rowid() as MessageId)
        })
        .await
    }

    async fn insert_inbound(
        &self,
        provider: &str,
        inbound: InboundMessage,
    ) -> Result<Message, StoreError> {
        let provider = provider.to_string();
        self.with_tx(move |tx| {
            if let Some(remote_id) = &inbound.provider_message_id {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM messages WHERE provider = ?1 AND provider_message_id = ?2",
                        params![provider, remote_id],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(internal)?;
                if exists.is_some() {
                    return Err(StoreError::Duplicate {
                        provider,
                        provider_message_id: remote_id.clone(),
                    });
                }
            }
            let now = now_text()?;
            tx.execute(
                "INSERT INTO messages (provider, direction, contact_type, from_addr, to_addr, title,
                 body, status, provider_message_id, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)",
                params![
                    provider,
                    Direction::Incoming.as_str(),
                    inbound.contact_type.as_str(),
                    inbound.from,
                    inbound.to.unwrap_or_default(),
                    inbound.title,
                    inbound.body,
                    MessageStatus::Received.as_str(),
                    inbound.provider_message_id,
                    now,
                ],
            )
            .map_err(internal)?;
            load(tx, tx.last_insert_rowid() as MessageId)
        })
        .await
    }

    async fn claim(
        &self,
        provider: &str,
        limit: Option<usize>,
        current: MessageStatus,
        update: StatusUpdate,
    ) -> Result<Vec<Message>, StoreError> {
        let target = claim_target(current, update)?;
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let provider = provider.to_string();
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);
        self.with_tx(move |tx| {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM messages
                     WHERE provider = ?1 AND direction = ?2 AND status = ?3
                     ORDER BY id LIMIT ?4"
                ))
                .map_err(internal)?;
            let mut claimed = stmt
                .query_map(
                    params![provider, Direction::Outgoing.as_str(), current.as_str(), limit],
                    row_to_message,
                )
                .map_err(internal)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(internal)?;
            if target != current {
                let now_raw = OffsetDateTime::now_utc();
                let now = now_raw
                    .format(&Rfc3339)
                    .map_err(|err| StoreError::Internal(err.into()))?;
                for message in &mut claimed {
                    tx.execute(
                        "UPDATE messages SET status = ?1, updated_at = ?2
                         WHERE id = ?3 AND status = ?4",
                        params![target.as_str(), now, message.id as i64, current.as_str()],
                    )
                    .map_err(internal)?;
                    message.status = target;
                    message.updated_at = now_raw;
                }
            }
            Ok(claimed)
        })
        .await
    }

    async fn record_attempt(
        &self,
        id: MessageId,
        expected: MessageStatus,
        outcome: AttemptOutcome,
    ) -> Result<Message, StoreError> {
        let target = attempt_target(id, expected, &outcome)?;
        self.with_tx(move |tx| {
            load_expecting(tx, id, expected)?;
            let now = now_text()?;
            let tracking_id = match outcome {
                AttemptOutcome::Sent { tracking_id } => Some(tracking_id),
                _ => None,
            };
            tx.execute(
                "UPDATE messages SET status = ?1, attempts = attempts + 1,
                 tracking_id = COALESCE(?2, tracking_id), updated_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![target.as_str(), tracking_id, now, id as i64, expected.as_str()],
            )
            .map_err(internal)?;
            load(tx, id)
        })
        .await
    }

    async fn transition(
        &self,
        id: MessageId,
        expected: MessageStatus,
        next: MessageStatus,
    ) -> Result<Message, StoreError> {
        let target = expected
            .transition(next)
            .map_err(|err| StoreError::transition(Some(id), err))?;
        self.with_tx(move |tx| {
            load_expecting(tx, id, expected)?;
            let now = now_text()?;
            tx.execute(
                "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![target.as_str(), now, id as i64, expected.as_str()],
            )
            .map_err(internal)?;
            load(tx, id)
        })
        .await
    }

    async fn get(&self, id: MessageId) -> Result<Message, StoreError> {
        self.with_tx(move |tx| load(tx, id)).await
    }

    async fn find_by_tracking_id(
        &self,
        provider: &str,
        tracking_id: &str,
    ) -> Result<Message, StoreError> {
        let provider = provider.to_string();
        let tracking_id = tracking_id.to_string();
        self.with_tx(move |tx| {
            tx.query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM messages
                     WHERE provider = ?1 AND tracking_id = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![provider, tracking_id],
                row_to_message,
            )
            .optional()
            .map_err(internal)?
            .ok_or_else(|| StoreError::NotFound(format!("tracking id {tracking_id}")))
        })
        .await
    }

    async fn list(&self, filter: MessageFilter) -> Result<Vec<Message>, StoreError> {
        self.with_tx(move |tx| {
            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(provider) = filter.provider {
                values.push(provider);
                clauses.push(format!("provider = ?{}", values.len()));
            }
            if let Some(status) = filter.status {
                values.push(status.as_str().to_string());
                clauses.push(format!("status = ?{}", values.len()));
            }
            if let Some(direction) = filter.direction {
                values.push(direction.as_str().to_string());
                clauses.push(format!("direction = ?{}", values.len()));
            }
            let mut sql = format!("SELECT {SELECT_COLUMNS} FROM messages");
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY id");
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = tx.prepare(&sql).map_err(internal)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_message)
                .map_err(internal)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(internal)?;
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContactType;
    use std::collections::HashSet;

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages.db");
        {
            let store = SqliteMessageStore::open(&path).unwrap();
            store
                .queue_outbound(NewOutbound::new("smssync", ContactType::Sms, "+1555", "hi"))
                .await
                .unwrap();
        }
        let store = SqliteMessageStore::open(&path).unwrap();
        let pending = store
            .list(MessageFilter {
                status: Some(MessageStatus::PendingPoll),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].to, "+1555");
        assert_eq!(pending[0].contact_type, ContactType::Sms);
    }

    #[tokio::test]
    async fn claim_and_attempt_roundtrip() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let msg = store
            .queue_outbound(NewOutbound::new("email", ContactType::Email, "a@b.com", "hi"))
            .await
            .unwrap();
        let claimed = store
            .claim("email", Some(5), MessageStatus::PendingPoll, StatusUpdate::default())
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, MessageStatus::Unknown);

        let sent = store
            .record_attempt(
                msg.id,
                MessageStatus::Unknown,
                AttemptOutcome::Sent {
                    tracking_id: "email-h-1-1".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(sent.status, MessageStatus::Sent);
        assert_eq!(sent.attempts, 1);

        let found = store.find_by_tracking_id("email", "email-h-1-1").await.unwrap();
        assert_eq!(found.id, msg.id);

        let delivered = store
            .transition(msg.id, MessageStatus::Sent, MessageStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn concurrent_claims_are_disjoint() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        for i in 0..30 {
            store
                .queue_outbound(NewOutbound::new("smssync", ContactType::Sms, i.to_string(), "x"))
                .await
                .unwrap();
        }
        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim("smssync", Some(7), MessageStatus::PendingPoll, StatusUpdate::default())
                    .await
                    .unwrap()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for message in handle.await.unwrap() {
                assert!(seen.insert(message.id));
            }
        }
        assert_eq!(seen.len(), 30);
    }

    #[tokio::test]
    async fn duplicate_inbound_is_rejected() {
        let store = SqliteMessageStore::open_in_memory().unwrap();
        let inbound = InboundMessage::new(ContactType::Email, "a@b.com", "hi")
            .with_provider_message_id("m-1");
        store.insert_inbound("email", inbound.clone()).await.unwrap();
        let err = store.insert_inbound("email", inbound).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }
}
