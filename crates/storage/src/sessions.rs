use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::{Session, SessionWithAgent};
use crate::{StorageError, StorageGateway};

impl StorageGateway {
    pub async fn create_session(
        &self,
        agent_id: Uuid,
        external_user_id: Option<String>,
        metadata: JsonMap,
    ) -> Result<Session, StorageError> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (agent_id, external_user_id, metadata)
            VALUES ($1, $2, $3)
            RETURNING id, agent_id, external_user_id, metadata, created_at, last_activity_at
            "#,
        )
        .bind(agent_id)
        .bind(external_user_id)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StorageError::not_found("agent", agent_id)
            }
            _ => StorageError::Database(e),
        })
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session, StorageError> {
        sqlx::query_as::<_, Session>(
            "SELECT id, agent_id, external_user_id, metadata, created_at, last_activity_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("session", id))
    }

    /// One logical fetch of the session and its owning agent.
    pub async fn get_session_with_agent(&self, id: Uuid) -> Result<SessionWithAgent, StorageError> {
        let session = self.get_session(id).await?;
        let agent = self.get_agent(session.agent_id).await?;
        Ok(SessionWithAgent { session, agent })
    }

    pub async fn list_sessions(
        &self,
        agent_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Session>, StorageError> {
        // confirm the agent exists so callers see 404 rather than an empty page
        self.get_agent(agent_id).await?;
        let rows = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, agent_id, external_user_id, metadata, created_at, last_activity_at
            FROM sessions WHERE agent_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(agent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn touch_session(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE sessions SET last_activity_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("session", id));
        }
        Ok(())
    }

}
