//! SQLite-backed conversation and message store.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{OptionalExtension, Params};
use thiserror::Error;
use tokio_rusqlite::Connection;

use super::types::{Conversation, ConversationPatch, ConversationStatus, Message};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type for conversation store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` storage error.
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// A stored row could not be mapped back to a domain value.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for conversation store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for conversations and their messages.
pub trait ConversationStore: Send + Sync {
    /// List all conversations, oldest first.
    fn list(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>>;

    /// List conversations whose status is `ended`, oldest first.
    fn list_ended(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>>;

    /// Get a conversation by id.
    fn get(&self, id: i64) -> StoreFuture<'_, StoreResult<Option<Conversation>>>;

    /// Create an active conversation.
    fn create(&self, title: String) -> StoreFuture<'_, StoreResult<Conversation>>;

    /// Apply a partial update. Returns `None` if the conversation is missing.
    fn update(
        &self,
        id: i64,
        patch: ConversationPatch,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>>;

    /// Delete a conversation and its messages. Returns whether a row was removed.
    fn delete(&self, id: i64) -> StoreFuture<'_, StoreResult<bool>>;

    /// Append a message stamped with the current time.
    fn append_message(
        &self,
        conversation_id: i64,
        sender: String,
        content: String,
    ) -> StoreFuture<'_, StoreResult<Message>>;

    /// Messages of a conversation in ascending timestamp order.
    fn messages(&self, conversation_id: i64) -> StoreFuture<'_, StoreResult<Vec<Message>>>;

    /// Store the summary and mark the conversation ended.
    fn finish(
        &self,
        id: i64,
        summary: String,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>>;
}

const SCHEMA: &str = "PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL DEFAULT 'active',
    summary TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    sender TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages (conversation_id, timestamp, id);";

const SELECT_CONVERSATIONS: &str =
    "SELECT id, title, start_time, end_time, status, summary FROM conversations";

/// `SQLite` implementation of [`ConversationStore`].
pub struct SqliteConversationStore {
    conn: Connection,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    async fn load(&self, scope: Scope) -> StoreResult<Vec<Conversation>> {
        let rows = self
            .conn
            .call(move |conn| Ok(load_conversations(conn, scope)?))
            .await?;

        rows.into_iter()
            .map(|(row, messages)| row.into_conversation(messages))
            .collect()
    }

    async fn load_one(&self, id: i64) -> StoreResult<Option<Conversation>> {
        Ok(self.load(Scope::One(id)).await?.into_iter().next())
    }
}

impl ConversationStore for SqliteConversationStore {
    fn list(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
        Box::pin(self.load(Scope::All))
    }

    fn list_ended(&self) -> StoreFuture<'_, StoreResult<Vec<Conversation>>> {
        Box::pin(self.load(Scope::Status(ConversationStatus::Ended)))
    }

    fn get(&self, id: i64) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        Box::pin(self.load_one(id))
    }

    fn create(&self, title: String) -> StoreFuture<'_, StoreResult<Conversation>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO conversations (title, start_time, status, summary)
                         VALUES (?1, ?2, ?3, '')",
                        rusqlite::params![title, now_ms, ConversationStatus::Active.as_str()],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            self.load_one(id).await?.ok_or_else(|| {
                StoreError::InvalidRecord(format!("conversation {id} missing after insert"))
            })
        })
    }

    fn update(
        &self,
        id: i64,
        patch: ConversationPatch,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let found = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let exists = tx
                        .query_row("SELECT 1 FROM conversations WHERE id = ?1", [id], |_| Ok(()))
                        .optional()?
                        .is_some();
                    if !exists {
                        return Ok(false);
                    }

                    if let Some(title) = &patch.title {
                        tx.execute(
                            "UPDATE conversations SET title = ?1 WHERE id = ?2",
                            rusqlite::params![title, id],
                        )?;
                    }
                    if let Some(status) = patch.status {
                        tx.execute(
                            "UPDATE conversations
                             SET status = ?1,
                                 end_time = CASE WHEN ?1 = 'ended'
                                     THEN COALESCE(end_time, ?2) ELSE NULL END
                             WHERE id = ?3",
                            rusqlite::params![status.as_str(), now_ms, id],
                        )?;
                    }
                    if let Some(summary) = &patch.summary {
                        tx.execute(
                            "UPDATE conversations SET summary = ?1 WHERE id = ?2",
                            rusqlite::params![summary, id],
                        )?;
                    }
                    tx.commit()?;
                    Ok(true)
                })
                .await?;

            if found {
                self.load_one(id).await
            } else {
                Ok(None)
            }
        })
    }

    fn delete(&self, id: i64) -> StoreFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            let removed = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [id])?;
                    let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
                    tx.commit()?;
                    Ok(removed > 0)
                })
                .await?;
            Ok(removed)
        })
    }

    fn append_message(
        &self,
        conversation_id: i64,
        sender: String,
        content: String,
    ) -> StoreFuture<'_, StoreResult<Message>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let row_sender = sender.clone();
            let row_content = content.clone();
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        "INSERT INTO messages (conversation_id, content, sender, timestamp)
                         VALUES (?1, ?2, ?3, ?4)",
                        rusqlite::params![conversation_id, row_content, row_sender, now_ms],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            Ok(Message {
                id,
                conversation_id,
                content,
                sender,
                timestamp: millis_to_datetime(now_ms)?,
            })
        })
    }

    fn messages(&self, conversation_id: i64) -> StoreFuture<'_, StoreResult<Vec<Message>>> {
        Box::pin(async move {
            let rows = self
                .conn
                .call(move |conn| Ok(load_messages(conn, conversation_id)?))
                .await?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    fn finish(
        &self,
        id: i64,
        summary: String,
    ) -> StoreFuture<'_, StoreResult<Option<Conversation>>> {
        Box::pin(async move {
            let now_ms = Utc::now().timestamp_millis();
            let updated = self
                .conn
                .call(move |conn| {
                    let updated = conn.execute(
                        "UPDATE conversations
                         SET summary = ?1, status = ?2, end_time = COALESCE(end_time, ?3)
                         WHERE id = ?4",
                        rusqlite::params![summary, ConversationStatus::Ended.as_str(), now_ms, id],
                    )?;
                    Ok(updated > 0)
                })
                .await?;

            if updated {
                self.load_one(id).await
            } else {
                Ok(None)
            }
        })
    }
}

#[derive(Clone, Copy)]
enum Scope {
    All,
    One(i64),
    Status(ConversationStatus),
}

struct ConversationRow {
    id: i64,
    title: String,
    start_ms: i64,
    end_ms: Option<i64>,
    status: String,
    summary: String,
}

impl ConversationRow {
    fn into_conversation(self, messages: Vec<MessageRow>) -> StoreResult<Conversation> {
        let status = ConversationStatus::from_str(&self.status).map_err(|value| {
            StoreError::InvalidRecord(format!("unknown conversation status '{value}'"))
        })?;
        let messages = messages
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Conversation {
            id: self.id,
            title: self.title,
            start_time: millis_to_datetime(self.start_ms)?,
            end_time: self.end_ms.map(millis_to_datetime).transpose()?,
            status,
            summary: self.summary,
            messages,
        })
    }
}

struct MessageRow {
    id: i64,
    conversation_id: i64,
    content: String,
    sender: String,
    timestamp_ms: i64,
}

impl MessageRow {
    fn into_message(self) -> StoreResult<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            content: self.content,
            sender: self.sender,
            timestamp: millis_to_datetime(self.timestamp_ms)?,
        })
    }
}

fn millis_to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::InvalidRecord(format!("invalid timestamp {ms}")))
}

fn load_conversations(
    conn: &rusqlite::Connection,
    scope: Scope,
) -> rusqlite::Result<Vec<(ConversationRow, Vec<MessageRow>)>> {
    let rows = match scope {
        Scope::All => {
            query_conversations(conn, &format!("{SELECT_CONVERSATIONS} ORDER BY id"), [])?
        }
        Scope::One(id) => query_conversations(
            conn,
            &format!("{SELECT_CONVERSATIONS} WHERE id = ?1"),
            [id],
        )?,
        Scope::Status(status) => query_conversations(
            conn,
            &format!("{SELECT_CONVERSATIONS} WHERE status = ?1 ORDER BY id"),
            [status.as_str()],
        )?,
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let messages = load_messages(conn, row.id)?;
        out.push((row, messages));
    }
    Ok(out)
}

fn query_conversations<P: Params>(
    conn: &rusqlite::Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<ConversationRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(ConversationRow {
            id: row.get(0)?,
            title: row.get(1)?,
            start_ms: row.get(2)?,
            end_ms: row.get(3)?,
            status: row.get(4)?,
            summary: row.get(5)?,
        })
    })?;
    let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(collected)
}

fn load_messages(
    conn: &rusqlite::Connection,
    conversation_id: i64,
) -> rusqlite::Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, content, sender, timestamp FROM messages
         WHERE conversation_id = ?1
         ORDER BY timestamp ASC, id ASC",
    )?;
    let rows = stmt.query_map([conversation_id], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            content: row.get(2)?,
            sender: row.get(3)?,
            timestamp_ms: row.get(4)?,
        })
    })?;
    let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(collected)
}
