//! libSQL backend — local storage for story state, the system conversation
//! and story messages.
//!
//! Supports local file and in-memory databases.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attachments::ProcessedAttachment;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ConversationProvider, MessageWriter, StoryCleanup, StoryStore, SystemConversation,
    settings_keys,
};
use crate::story::message::{MessageType, ReadStatus, SeenStatus, StoryMessage};
use crate::story::state::{StoryPhase, StoryRecord};

/// Identity system messages are attributed to.
pub const SYSTEM_SERVICE_ID: &str = "00000000-0000-0000-0000-000000000001";

const SYSTEM_CONVERSATION_NAME: &str = "Signal";

const MESSAGE_COLUMNS: &str = "id, conversation_id, source_service_id, timestamp, attachment_id, \
     attachment_path, content_type, size, read_status, seen_status, can_reply_to_story";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;
                let value = serde_json::from_str(&value_str)
                    .map_err(|e| DatabaseError::Serialization(format!("{key}: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    /// All stored story messages, oldest first.
    pub async fn list_story_messages(&self) -> Result<Vec<StoryMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM story_messages ORDER BY timestamp ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_story_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_story_messages: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    /// Number of stored story messages.
    pub async fn count_story_messages(&self) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM story_messages", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_story_messages: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count_story_messages: {e}")))?
            .ok_or_else(|| DatabaseError::Query("count_story_messages: no row".into()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("count_story_messages: {e}")))?;
        Ok(count as usize)
    }

    async fn attachment_path(&self, id: &Uuid) -> Result<Option<PathBuf>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT attachment_path FROM story_messages WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("attachment_path: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let path: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("attachment_path: {e}")))?;
                Ok(Some(PathBuf::from(path)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("attachment_path: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

async fn remove_attachment_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove story attachment");
        }
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s}: {e}")))
}

fn row_to_message(row: &libsql::Row) -> Result<StoryMessage, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };
    let int = |idx: i32| -> Result<i64, DatabaseError> {
        row.get::<i64>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };

    Ok(StoryMessage {
        id: parse_uuid(&text(0)?)?,
        conversation_id: parse_uuid(&text(1)?)?,
        source_service_id: text(2)?,
        timestamp: int(3)?,
        attachment: ProcessedAttachment {
            id: parse_uuid(&text(4)?)?,
            path: PathBuf::from(text(5)?),
            content_type: text(6)?,
            size: int(7)? as u64,
        },
        read_status: ReadStatus::parse(&text(8)?),
        seen_status: SeenStatus::parse(&text(9)?),
        can_reply_to_story: int(10)? != 0,
        message_type: MessageType::Story,
    })
}

// ── Collaborator implementations ────────────────────────────────────

#[async_trait]
impl StoryStore for LibSqlBackend {
    async fn has_viewed(&self) -> Result<bool, DatabaseError> {
        Ok(self
            .get_setting(settings_keys::HAS_VIEWED_ONBOARDING_STORY)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn set_has_viewed(&self, viewed: bool) -> Result<(), DatabaseError> {
        self.set_setting(
            settings_keys::HAS_VIEWED_ONBOARDING_STORY,
            &serde_json::Value::Bool(viewed),
        )
        .await
    }

    async fn load_record(&self) -> Result<Option<StoryRecord>, DatabaseError> {
        match self.get_setting(settings_keys::ONBOARDING_STORY).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("onboarding story record: {e}"))),
            None => Ok(None),
        }
    }

    async fn save_record(&self, record: &StoryRecord) -> Result<(), DatabaseError> {
        let value = serde_json::to_value(record)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.set_setting(settings_keys::ONBOARDING_STORY, &value).await?;
        debug!(phase = %record.phase, ids = record.message_ids.len(), "Story record saved");
        Ok(())
    }
}

#[async_trait]
impl MessageWriter for LibSqlBackend {
    async fn save_messages(&self, messages: &[StoryMessage]) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_messages begin: {e}")))?;

        let now = Utc::now().to_rfc3339();
        for message in messages {
            let inserted = tx
                .execute(
                    "INSERT INTO story_messages (id, conversation_id, source_service_id, timestamp,
                        attachment_id, attachment_path, content_type, size, read_status,
                        seen_status, can_reply_to_story, message_type, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        message.id.to_string(),
                        message.conversation_id.to_string(),
                        message.source_service_id.clone(),
                        message.timestamp,
                        message.attachment.id.to_string(),
                        message.attachment.path.to_string_lossy().into_owned(),
                        message.attachment.content_type.clone(),
                        message.attachment.size as i64,
                        message.read_status.as_str(),
                        message.seen_status.as_str(),
                        message.can_reply_to_story as i64,
                        message.message_type.as_str(),
                        now.clone(),
                    ],
                )
                .await;

            if let Err(e) = inserted {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed story insert failed");
                }
                return Err(DatabaseError::Query(format!("save_messages: {e}")));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_messages commit: {e}")))?;
        debug!(count = messages.len(), "Story messages saved");
        Ok(())
    }

    async fn delete_messages(&self, ids: &[Uuid]) -> Result<usize, DatabaseError> {
        let mut removed = 0;
        for id in ids {
            let path = self.attachment_path(id).await?;
            let count = self
                .conn()
                .execute(
                    "DELETE FROM story_messages WHERE id = ?1",
                    params![id.to_string()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("delete_messages: {e}")))?;
            removed += count as usize;

            if let Some(path) = path {
                remove_attachment_file(&path).await;
            }
        }
        debug!(requested = ids.len(), removed, "Story messages deleted");
        Ok(removed)
    }
}

#[async_trait]
impl ConversationProvider for LibSqlBackend {
    async fn get_or_create_system_conversation(&self) -> Result<SystemConversation, DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO conversations (id, kind, service_id, name, created_at)
                 VALUES (?1, 'system', ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    SYSTEM_SERVICE_ID,
                    SYSTEM_CONVERSATION_NAME,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create system conversation: {e}")))?;

        let mut rows = self
            .conn()
            .query(
                "SELECT id, service_id, name FROM conversations WHERE kind = 'system'",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get system conversation: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get system conversation: {e}")))?
            .ok_or_else(|| DatabaseError::Query("system conversation missing after insert".into()))?;

        let field = |idx: i32| {
            row.get::<String>(idx)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
        };
        Ok(SystemConversation {
            id: parse_uuid(&field(0)?)?,
            service_id: field(1)?,
            name: field(2)?,
        })
    }
}

#[async_trait]
impl StoryCleanup for LibSqlBackend {
    async fn find_and_delete_if_exists(&self) -> Result<(), DatabaseError> {
        let Some(mut record) = self.load_record().await? else {
            debug!("No onboarding story to delete");
            return Ok(());
        };
        if record.phase == StoryPhase::Deleted
            || (record.message_ids.is_empty() && record.attachment_paths.is_empty())
        {
            debug!(phase = %record.phase, "No onboarding story to delete");
            return Ok(());
        }

        let removed = self.delete_messages(&record.message_ids).await?;
        // Files of a provisional batch may have no message row.
        for path in &record.attachment_paths {
            remove_attachment_file(path).await;
        }
        record
            .transition(StoryPhase::Deleted, Vec::new(), record.manifest_version.clone())
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        self.save_record(&record).await?;

        info!(removed, "Onboarding story deleted");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
