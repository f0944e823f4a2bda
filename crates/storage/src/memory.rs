use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::{DistanceMetric, MemoryChunk};
use crate::vector::{format_vector, parse_vector};
use crate::{StorageError, StorageGateway};

pub struct NewMemoryChunk {
    pub agent_id: Uuid,
    pub session_id: Option<Uuid>,
    pub message_id: Option<i64>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub importance_score: f32,
    pub metadata: JsonMap,
}

#[derive(sqlx::FromRow)]
struct MemoryChunkRow {
    id: Uuid,
    agent_id: Uuid,
    session_id: Option<Uuid>,
    message_id: Option<i64>,
    content: String,
    embedding_text: String,
    importance_score: f32,
    metadata: JsonMap,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl MemoryChunkRow {
    fn into_chunk(self) -> Result<MemoryChunk, StorageError> {
        Ok(MemoryChunk {
            id: self.id,
            agent_id: self.agent_id,
            session_id: self.session_id,
            message_id: self.message_id,
            content: self.content,
            embedding: parse_vector(&self.embedding_text)?,
            importance_score: self.importance_score,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

const SELECT_CHUNK: &str = r#"
    SELECT id, agent_id, session_id, message_id, content, embedding::text AS embedding_text,
           importance_score, metadata, created_at
    FROM memory_chunks
"#;

impl StorageGateway {
    pub async fn create_memory_chunk(&self, new: NewMemoryChunk) -> Result<MemoryChunk, StorageError> {
        let embedding_text = format_vector(&new.embedding);
        let row: MemoryChunkRow = sqlx::query_as(
            r#"
            INSERT INTO memory_chunks (agent_id, session_id, message_id, content, embedding, importance_score, metadata)
            VALUES ($1, $2, $3, $4, $5::vector, $6, $7)
            RETURNING id, agent_id, session_id, message_id, content, embedding::text AS embedding_text,
                      importance_score, metadata, created_at
            "#,
        )
        .bind(new.agent_id)
        .bind(new.session_id)
        .bind(new.message_id)
        .bind(&new.content)
        .bind(&embedding_text)
        .bind(new.importance_score)
        .bind(new.metadata)
        .fetch_one(&self.pool)
        .await?;
        row.into_chunk()
    }

    /// Top-`k` by ascending distance under the given metric, ties broken by
    /// recency (newer first).
    pub async fn retrieve_memory_chunks(
        &self,
        agent_id: Uuid,
        query_embedding: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<MemoryChunk>, StorageError> {
        let query_text = format_vector(query_embedding);
        let operator = metric.operator();
        let sql = format!(
            "{SELECT_CHUNK} WHERE agent_id = $1 ORDER BY embedding {operator} $2::vector ASC, created_at DESC LIMIT $3"
        );
        let rows: Vec<MemoryChunkRow> = sqlx::query_as(&sql)
            .bind(agent_id)
            .bind(&query_text)
            .bind(k)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(MemoryChunkRow::into_chunk).collect()
    }
}
