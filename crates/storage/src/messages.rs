use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::{Message, MessageRole};
use crate::{StorageError, StorageGateway};

pub struct NewMessage {
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub tool_call_id: Option<String>,
    pub token_count: Option<i32>,
    pub metadata: JsonMap,
}

impl StorageGateway {
    /// `id` allocation is monotonic within a session — left to the
    /// database's `BIGSERIAL` rather than computed here.
    pub async fn create_message(&self, new: NewMessage) -> Result<Message, StorageError> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (session_id, role, content, tool_name, tool_call_id, token_count, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, session_id, role, content, tool_name, tool_call_id, token_count, metadata, created_at
            "#,
        )
        .bind(new.session_id)
        .bind(new.role)
        .bind(&new.content)
        .bind(&new.tool_name)
        .bind(&new.tool_call_id)
        .bind(new.token_count)
        .bind(new.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageError::not_found("session", new.session_id)
            }
            _ => StorageError::Database(e),
        })
    }

    /// Newest-first; callers reverse when chronological order is needed.
    pub async fn get_recent_messages(
        &self,
        session_id: Uuid,
        n: i64,
    ) -> Result<Vec<Message>, StorageError> {
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, tool_name, tool_call_id, token_count, metadata, created_at
            FROM messages WHERE session_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_messages(
        &self,
        session_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, StorageError> {
        self.get_session(session_id).await?;
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, role, content, tool_name, tool_call_id, token_count, metadata, created_at
            FROM messages WHERE session_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
