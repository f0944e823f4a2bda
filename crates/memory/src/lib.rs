//! Long-term memory: async write-back after a successful turn
//! (`StoreChunks`) and top-k ANN recall (`Retrieve`).

use agentrun_llm::LlmClient;
use agentrun_storage::{DistanceMetric, JsonMap, MemoryChunk, NewMemoryChunk, StorageGateway};
use uuid::Uuid;

/// Baseline used for every chunk this manager writes. Per-chunk scoring
/// (decay, access frequency, eviction) is a policy layered on top of this
/// model and out of scope here — every chunk starts level.
const DEFAULT_IMPORTANCE_SCORE: f32 = 0.5;

#[derive(Clone)]
pub struct MemoryManager {
    storage: StorageGateway,
    llm: LlmClient,
}

impl MemoryManager {
    pub fn new(storage: StorageGateway, llm: LlmClient) -> Self {
        Self { storage, llm }
    }

    /// Default salience policy: the assistant's full text in one chunk,
    /// each non-empty tool result in its own chunk. Embedding or write
    /// failures are logged, never propagated — this only ever runs from
    /// the async write-back path, after the turn has already responded.
    pub async fn store_chunks(
        &self,
        agent_id: Uuid,
        session_id: Uuid,
        model: &str,
        assistant_text: &str,
        tool_results: &[(Option<i64>, String)],
    ) {
        let mut spans: Vec<(Option<i64>, &str)> = Vec::new();
        if !assistant_text.trim().is_empty() {
            spans.push((None, assistant_text));
        }
        for (message_id, content) in tool_results {
            if !content.trim().is_empty() {
                spans.push((*message_id, content.as_str()));
            }
        }

        for (message_id, content) in spans {
            let embedding = match self.llm.embed(content, model).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, agent_id = %agent_id, "memory write-back: embedding failed, dropping chunk");
                    continue;
                }
            };
            let result = self
                .storage
                .create_memory_chunk(NewMemoryChunk {
                    agent_id,
                    session_id: Some(session_id),
                    message_id,
                    content: content.to_string(),
                    embedding,
                    importance_score: DEFAULT_IMPORTANCE_SCORE,
                    metadata: JsonMap::new(),
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, agent_id = %agent_id, "memory write-back: failed to persist chunk");
            }
        }
    }

    /// Top-`k` by ascending distance, cosine by default; the caller
    /// (context assembler) passes the agent's configured metric.
    pub async fn retrieve(
        &self,
        agent_id: Uuid,
        query_embedding: &[f32],
        k: i64,
        metric: DistanceMetric,
    ) -> Result<Vec<MemoryChunk>, agentrun_storage::StorageError> {
        self.storage.retrieve_memory_chunks(agent_id, query_embedding, k, metric).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_importance_score_is_midpoint() {
        assert_eq!(DEFAULT_IMPORTANCE_SCORE, 0.5);
    }
}
