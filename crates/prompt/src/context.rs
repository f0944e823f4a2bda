use agentrun_llm::{estimate_tokens, LlmClient};
use agentrun_memory::MemoryManager;
use agentrun_storage::{Agent, DistanceMetric, MemoryChunk, Message, StorageGateway};
use serde_json::Value;
use uuid::Uuid;

/// Token budget reserved for the system prompt, instruction block, and
/// the model's own completion — left out of the `max_tokens` comparison
/// so the context never fills the entire window.
const DEFAULT_RESERVE_TOKENS: u32 = 512;

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub messages: Vec<Message>,
    pub memory_chunks: Vec<MemoryChunk>,
}

pub struct ContextAssembler {
    storage: StorageGateway,
    llm: LlmClient,
    memory: MemoryManager,
}

impl ContextAssembler {
    pub fn new(storage: StorageGateway, llm: LlmClient, memory: MemoryManager) -> Self {
        Self { storage, llm, memory }
    }

    pub async fn assemble(
        &self,
        agent: &Agent,
        session_id: Uuid,
        user_text: &str,
        recent_messages_limit: i64,
        memory_recall_limit: i64,
    ) -> Result<Context, agentrun_storage::StorageError> {
        let mut messages = self.storage.get_recent_messages(session_id, recent_messages_limit).await?;
        messages.reverse(); // storage returns newest-first; callers want chronological order

        let distance_metric = distance_metric_from_config(&agent.config);
        let memory_chunks = match self.llm.embed(user_text, &agent.model_name).await {
            Ok(embedding) => self
                .memory
                .retrieve(agent.id, &embedding, memory_recall_limit, distance_metric)
                .await
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };

        let max_tokens = agent
            .config
            .get("max_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(4096) as u32;
        let budget = max_tokens.saturating_sub(DEFAULT_RESERVE_TOKENS);

        Ok(compress(Context { messages, memory_chunks }, user_text, budget))
    }
}

fn distance_metric_from_config(config: &agentrun_storage::JsonMap) -> DistanceMetric {
    match config.get("distance_metric").and_then(Value::as_str) {
        Some("l2") => DistanceMetric::L2,
        Some("inner_product") => DistanceMetric::InnerProduct,
        _ => DistanceMetric::Cosine,
    }
}

/// Keeps every memory chunk intact. From the message list, keeps the
/// most recent messages that still fit the budget, prepending to
/// preserve chronological order. If memory alone exceeds the budget,
/// returns just the memory and the most recent user turn — the current
/// user message is never dropped.
fn compress(context: Context, current_user_text: &str, budget: u32) -> Context {
    let memory_tokens: u32 = context.memory_chunks.iter().map(|c| estimate_tokens(&c.content)).sum();

    if memory_tokens >= budget {
        return Context { messages: last_user_message(context.messages, current_user_text), memory_chunks: context.memory_chunks };
    }

    let mut remaining = budget - memory_tokens;
    let mut kept: Vec<Message> = Vec::new();
    for message in context.messages.into_iter().rev() {
        let tokens = estimate_tokens(&message.content);
        if tokens > remaining && !kept.is_empty() {
            break;
        }
        remaining = remaining.saturating_sub(tokens);
        kept.push(message);
    }
    kept.reverse();
    Context { messages: kept, memory_chunks: context.memory_chunks }
}

fn last_user_message(messages: Vec<Message>, current_user_text: &str) -> Vec<Message> {
    match messages.into_iter().rev().find(|m| matches!(m.role, agentrun_storage::MessageRole::User)) {
        Some(m) => vec![m],
        None if !current_user_text.is_empty() => vec![synthesize_user_message(current_user_text)],
        None => vec![],
    }
}

/// Builds a transient, unpersisted `Message` for the current turn's text so
/// a session's first turn still has something to send the model when memory
/// alone exceeds the budget — the current user message is never dropped.
fn synthesize_user_message(current_user_text: &str) -> Message {
    Message {
        id: 0,
        session_id: Uuid::nil(),
        role: agentrun_storage::MessageRole::User,
        content: current_user_text.to_string(),
        tool_name: None,
        tool_call_id: None,
        token_count: None,
        metadata: agentrun_storage::JsonMap::new(),
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_storage::{JsonMap, MessageRole};
    use chrono::Utc;

    fn message(role: MessageRole, content: &str) -> Message {
        Message {
            id: 1,
            session_id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            tool_name: None,
            tool_call_id: None,
            token_count: None,
            metadata: JsonMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn compress_keeps_all_memory_and_trims_messages() {
        let long_message = message(MessageRole::User, &"x".repeat(4000));
        let short_message = message(MessageRole::User, "hi");
        let context = Context { messages: vec![long_message, short_message], memory_chunks: vec![] };
        let compressed = compress(context, "hi", 100);
        assert!(compressed.messages.len() <= 2);
        assert!(compressed.messages.last().unwrap().content == "hi");
    }

    #[test]
    fn compress_never_returns_empty_when_messages_present() {
        let msg = message(MessageRole::User, "hello");
        let context = Context { messages: vec![msg], memory_chunks: vec![] };
        let compressed = compress(context, "hello", 1);
        assert_eq!(compressed.messages.len(), 1);
    }

    #[test]
    fn compress_synthesizes_current_turn_on_first_message_when_memory_exceeds_budget() {
        let chunk = agentrun_storage::MemoryChunk {
            id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            session_id: None,
            message_id: None,
            content: "x".repeat(4000),
            embedding: vec![],
            importance_score: 0.0,
            metadata: JsonMap::new(),
            created_at: Utc::now(),
        };
        let context = Context { messages: vec![], memory_chunks: vec![chunk] };
        let compressed = compress(context, "what's the weather today?", 100);
        assert_eq!(compressed.messages.len(), 1);
        assert_eq!(compressed.messages[0].content, "what's the weather today?");
        assert!(matches!(compressed.messages[0].role, MessageRole::User));
    }
}
