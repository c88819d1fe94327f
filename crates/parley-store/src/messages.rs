use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, instrument};

use parley_core::{ConversationId, DocumentId, MessageDocument};

use crate::database::Database;
use crate::error::StoreError;

/// Insert-and-assign-id document store for chat messages.
///
/// Calls block on I/O; async callers must run them on a blocking worker.
pub trait MessageStore: Send + Sync + 'static {
    fn insert(&self, message: &MessageDocument) -> Result<DocumentId, StoreError>;
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch one stored message by id.
    #[instrument(skip(self), fields(id = %id))]
    pub fn get(&self, id: DocumentId) -> Result<MessageDocument, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, chat_id, role, content, created_at FROM messages WHERE id = ?1",
                    [id.get()],
                    read_row,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("message {id}"))
                    }
                    other => StoreError::from(other),
                })?;
            row.into_document()
        })
    }

    /// All messages of a conversation, oldest first.
    #[instrument(skip(self), fields(chat_id = %chat_id))]
    pub fn list_for_conversation(
        &self,
        chat_id: &ConversationId,
    ) -> Result<Vec<MessageDocument>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, role, content, created_at FROM messages
                 WHERE chat_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([chat_id.as_str()], read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(RawRow::into_document).collect()
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?))
    }
}

impl MessageStore for MessageRepo {
    #[instrument(skip(self, message), fields(chat_id = %message.chat_id))]
    fn insert(&self, message: &MessageDocument) -> Result<DocumentId, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.chat_id.as_str(),
                    message.role,
                    message.content,
                    message.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )?;
            let id = DocumentId::new(conn.last_insert_rowid());
            debug!(id = %id, "inserted message");
            Ok(id)
        })
    }
}

struct RawRow {
    id: i64,
    chat_id: String,
    role: String,
    content: String,
    created_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl RawRow {
    fn into_document(self) -> Result<MessageDocument, StoreError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::CorruptRow {
                table: "messages",
                column: "created_at",
                detail: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(MessageDocument {
            chat_id: ConversationId::from_raw(self.chat_id),
            role: self.role,
            content: self.content,
            created_at,
            id: Some(DocumentId::new(self.id)),
        })
    }
}
