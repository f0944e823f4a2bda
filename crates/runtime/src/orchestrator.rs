use std::sync::Arc;
use std::time::Duration;

use agentrun_exec::{ToolCall as ExecToolCall, ToolInvoker, ToolResult as ExecToolResult};
use agentrun_llm::{GenerationConfig, LlmClient, StreamSink, TokenUsage};
use agentrun_memory::MemoryManager;
use agentrun_prompt::{parse_tool_calls, ContextAssembler, PromptBuilder};
use agentrun_storage::{Agent, MessageRole, NewMessage, StorageGateway};
use agentrun_tools::ToolRegistry;
use uuid::Uuid;

use crate::error::{AppError, ErrorContext};
use crate::session_lock::SessionLocks;
use crate::shutdown::DrainTracker;

pub struct TurnOutcome {
    pub content: String,
    pub tokens_used: TokenUsage,
    pub tool_calls: Vec<ExecToolCall>,
    pub tool_results: Vec<ExecToolResult>,
}

/// Output of steps 1-7: everything needed either to hand the final prompt
/// to a second non-streaming LLM call, or to stream it, followed by the
/// shared persistence tail (steps 8-9).
struct PreparedTurn {
    agent: Agent,
    cfg: GenerationConfig,
    exec_calls: Vec<ExecToolCall>,
    tool_results: Vec<ExecToolResult>,
    first_pass_usage: TokenUsage,
    /// `Some(prompt)` when tool calls were made and a further LLM call is
    /// needed to produce the user-visible answer; `None` when the first
    /// pass's text already is that answer.
    follow_up_prompt: Option<String>,
    first_pass_text: String,
}

pub struct TurnOrchestrator {
    storage: StorageGateway,
    llm: LlmClient,
    context_assembler: ContextAssembler,
    tool_invoker: ToolInvoker,
    tool_registry: Arc<ToolRegistry>,
    memory: Arc<MemoryManager>,
    session_locks: Arc<SessionLocks>,
    drain: DrainTracker,
    recent_messages_limit: i64,
    memory_recall_limit: i64,
    memory_writeback_deadline: Duration,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: StorageGateway,
        llm: LlmClient,
        context_assembler: ContextAssembler,
        tool_invoker: ToolInvoker,
        tool_registry: Arc<ToolRegistry>,
        memory: Arc<MemoryManager>,
        session_locks: Arc<SessionLocks>,
        drain: DrainTracker,
        recent_messages_limit: i64,
        memory_recall_limit: i64,
        memory_writeback_deadline: Duration,
    ) -> Self {
        Self {
            storage,
            llm,
            context_assembler,
            tool_invoker,
            tool_registry,
            memory,
            session_locks,
            drain,
            recent_messages_limit,
            memory_recall_limit,
            memory_writeback_deadline,
        }
    }

    /// Steps 1-7: loads session/agent, assembles context, runs the first
    /// LLM pass, and — if it asked for tools — executes them and builds
    /// the follow-up prompt. Does not make the second LLM call itself, so
    /// callers can choose streaming or non-streaming for that last hop.
    async fn prepare(&self, session_id: Uuid, user_text: &str) -> Result<PreparedTurn, AppError> {
        // Step 1: load session and agent.
        let with_agent = self.storage.get_session_with_agent(session_id).await.map_err(AppError::from)?;
        let agent = with_agent.agent;

        // Step 2: assemble context. Embedding failure is absorbed inside
        // the assembler (proceeds with empty memory); only a hard storage
        // failure reaches here.
        let context = self
            .context_assembler
            .assemble(&agent, session_id, user_text, self.recent_messages_limit, self.memory_recall_limit)
            .await
            .map_err(|e| AppError::ContextError(ErrorContext::new(e.to_string()).with_session(session_id)))?;

        // Step 3: build prompt.
        let tools = self.tool_registry.list();
        let enabled_tools: Vec<_> = tools.into_iter().filter(|t| agent.enabled_tools.contains(&t.name)).collect();
        let builder = PromptBuilder::new(&agent.system_prompt, &enabled_tools);
        let prompt = builder.build(&context, user_text);

        // Step 4: call LLM, first pass.
        let cfg = GenerationConfig::from_map(&agent.config);
        let (first_pass_text, first_pass_usage) = self
            .llm
            .generate(&prompt, &agent.model_name, &cfg)
            .await
            .map_err(|e| AppError::LlmError(ErrorContext::new(e.to_string()).with_session(session_id)))?;

        // Step 5: parse tool calls. A malformed or absent block yields an
        // empty list, which is not a failure — it just skips to step 8.
        let parsed_calls = parse_tool_calls(&first_pass_text);

        if parsed_calls.is_empty() {
            return Ok(PreparedTurn {
                agent,
                cfg,
                exec_calls: Vec::new(),
                tool_results: Vec::new(),
                first_pass_usage,
                follow_up_prompt: None,
                first_pass_text,
            });
        }

        let exec_calls: Vec<ExecToolCall> = parsed_calls
            .iter()
            .map(|c| ExecToolCall { id: c.id.clone(), name: c.name.clone(), arguments: c.arguments.clone() })
            .collect();

        // Step 6: execute tool calls. Per-call failures are captured,
        // never abort the turn.
        let tool_results = self.tool_invoker.invoke_all(&agent, &exec_calls).await;

        // Step 7: build prompt with tool results, ready for the second pass.
        let result_pairs: Vec<(String, String)> = tool_results
            .iter()
            .map(|r| (r.tool_call_id.clone(), if let Some(err) = &r.error { err.clone() } else { r.content.clone() }))
            .collect();
        let tool_call_block = extract_tool_call_block(&first_pass_text);
        let follow_up_prompt = builder.build_with_tool_results(&context, user_text, &tool_call_block, &result_pairs);

        Ok(PreparedTurn {
            agent,
            cfg,
            exec_calls,
            tool_results,
            first_pass_usage,
            follow_up_prompt: Some(follow_up_prompt),
            first_pass_text,
        })
    }

    /// Steps 8-9: persists the turn as one logical unit, then schedules
    /// the async memory write-back. Shared by the streaming and
    /// non-streaming turn paths.
    async fn finish(
        &self,
        session_id: Uuid,
        user_text: &str,
        prepared: PreparedTurn,
        final_text: String,
        final_usage: TokenUsage,
    ) -> Result<TurnOutcome, AppError> {
        let PreparedTurn { agent, tool_results, exec_calls, first_pass_usage, .. } = prepared;
        let tokens_used = first_pass_usage.sum(final_usage);

        // Step 8: persist. The assistant message is written last so a
        // reader filtering for "does this turn have a matching assistant
        // message" never observes a partial turn if the storage layer
        // lacks real transactions.
        self.storage
            .create_message(NewMessage {
                session_id,
                role: MessageRole::User,
                content: user_text.to_string(),
                tool_name: None,
                tool_call_id: None,
                token_count: None,
                metadata: Default::default(),
            })
            .await
            .map_err(AppError::from)?;

        // Step 8 (cont'd): one assistant-role tool-call stub per parsed
        // call, persisted before its matching tool result so a reader can
        // always find a preceding stub for every `tool_call_id` on a
        // `Tool`-role message.
        for call in &exec_calls {
            self.storage
                .create_message(NewMessage {
                    session_id,
                    role: MessageRole::Assistant,
                    content: serde_json::to_string(&call.arguments).unwrap_or_default(),
                    tool_name: Some(call.name.clone()),
                    tool_call_id: Some(call.id.clone()),
                    token_count: None,
                    metadata: Default::default(),
                })
                .await
                .map_err(AppError::from)?;
        }

        let mut persisted_tool_message_ids = Vec::new();
        for result in &tool_results {
            let message = self
                .storage
                .create_message(NewMessage {
                    session_id,
                    role: MessageRole::Tool,
                    content: if let Some(err) = &result.error { err.clone() } else { result.content.clone() },
                    tool_name: None,
                    tool_call_id: Some(result.tool_call_id.clone()),
                    token_count: None,
                    metadata: Default::default(),
                })
                .await
                .map_err(AppError::from)?;
            persisted_tool_message_ids.push(message.id);
        }

        self.storage
            .create_message(NewMessage {
                session_id,
                role: MessageRole::Assistant,
                content: final_text.clone(),
                tool_name: None,
                tool_call_id: None,
                token_count: Some(tokens_used.completion as i32),
                metadata: Default::default(),
            })
            .await
            .map_err(AppError::from)?;

        self.storage.touch_session(session_id).await.map_err(AppError::from)?;

        // Step 9: schedule async memory write-back, independent deadline,
        // never delaying the response. The session lock is already
        // released (its guard lived only in the caller's stack frame,
        // around `prepare`/`finish`, not around this spawn).
        let memory = self.memory.clone();
        let deadline = self.memory_writeback_deadline;
        let drain_guard = self.drain.guard();
        let model_name = agent.model_name.clone();
        let tool_texts: Vec<(Option<i64>, String)> = persisted_tool_message_ids
            .into_iter()
            .zip(tool_results.iter())
            .map(|(id, r)| (Some(id), if let Some(err) = &r.error { err.clone() } else { r.content.clone() }))
            .collect();
        let agent_id = agent.id;
        let write_back_text = final_text.clone();
        tokio::spawn(async move {
            let _guard = drain_guard;
            let write_back = memory.store_chunks(agent_id, session_id, &model_name, &write_back_text, &tool_texts);
            if tokio::time::timeout(deadline, write_back).await.is_err() {
                tracing::warn!(agent_id = %agent_id, session_id = %session_id, "memory write-back missed its deadline");
            }
        });

        Ok(TurnOutcome { content: final_text, tokens_used, tool_calls: exec_calls, tool_results })
    }

    pub async fn run_turn(&self, session_id: Uuid, user_text: &str) -> Result<TurnOutcome, AppError> {
        let _guard = self.session_locks.acquire(session_id).await;
        let prepared = self.prepare(session_id, user_text).await?;

        let (final_text, final_usage) = match &prepared.follow_up_prompt {
            Some(follow_up_prompt) => self
                .llm
                .generate(follow_up_prompt, &prepared.agent.model_name, &prepared.cfg)
                .await
                .map_err(|e| AppError::LlmError(ErrorContext::new(e.to_string()).with_session(session_id)))?,
            None => (prepared.first_pass_text.clone(), TokenUsage::default()),
        };

        self.finish(session_id, user_text, prepared, final_text, final_usage).await
    }

    /// Same nine steps as [`Self::run_turn`], but the pass that produces
    /// the user-visible answer streams into `sink` instead of returning
    /// all at once. When the first pass didn't ask for any tools, that
    /// pass already ran to completion before a caller could stream it —
    /// its text is pushed to `sink` as a single chunk. A genuine
    /// token-by-token stream only happens on the second pass, after tool
    /// execution.
    pub async fn run_turn_streaming(
        &self,
        session_id: Uuid,
        user_text: &str,
        sink: &mut dyn StreamSink,
    ) -> Result<TurnOutcome, AppError> {
        let _guard = self.session_locks.acquire(session_id).await;
        let prepared = self.prepare(session_id, user_text).await?;

        let (final_text, final_usage) = match &prepared.follow_up_prompt {
            Some(follow_up_prompt) => {
                let mut capture = CapturingSink { inner: sink, text: String::new() };
                let usage = self
                    .llm
                    .generate_stream(follow_up_prompt, &prepared.agent.model_name, &prepared.cfg, &mut capture)
                    .await
                    .map_err(|e| AppError::LlmError(ErrorContext::new(e.to_string()).with_session(session_id)))?;
                (capture.text, usage)
            }
            None => {
                sink.push(prepared.first_pass_text.clone());
                (prepared.first_pass_text.clone(), TokenUsage::default())
            }
        };

        self.finish(session_id, user_text, prepared, final_text, final_usage).await
    }
}

/// Forwards each chunk to the real sink while also accumulating the full
/// text, since `generate_stream` only returns token usage.
struct CapturingSink<'a> {
    inner: &'a mut dyn StreamSink,
    text: String,
}

impl StreamSink for CapturingSink<'_> {
    fn push(&mut self, chunk: String) {
        self.text.push_str(&chunk);
        self.inner.push(chunk);
    }
}

/// Extracts just the fenced tool-call block from an assistant message, for
/// inclusion in the second-pass prompt.
fn extract_tool_call_block(assistant_text: &str) -> String {
    let positions: Vec<usize> = assistant_text.match_indices("```").map(|(i, _)| i).collect();
    if positions.len() < 2 {
        return String::new();
    }
    let open = positions[positions.len() - 2];
    let close = positions[positions.len() - 1] + 3;
    assistant_text[open..close].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_whole_fenced_block_including_fences() {
        let text = "I'll check that.\n```json\n{\"tool_calls\": []}\n```";
        let block = extract_tool_call_block(text);
        assert_eq!(block, "```json\n{\"tool_calls\": []}\n```");
    }

    #[test]
    fn extracts_last_block_when_several_present() {
        let text = "```json\n{\"scratch\": true}\n```\nsome text\n```json\n[{\"id\":\"1\"}]\n```";
        let block = extract_tool_call_block(text);
        assert_eq!(block, "```json\n[{\"id\":\"1\"}]\n```");
    }

    #[test]
    fn no_fence_yields_empty_string() {
        assert_eq!(extract_tool_call_block("plain answer, no tools"), "");
    }

    #[test]
    fn capturing_sink_accumulates_while_forwarding() {
        struct VecSink(Vec<String>);
        impl StreamSink for VecSink {
            fn push(&mut self, chunk: String) {
                self.0.push(chunk);
            }
        }

        let mut inner = VecSink(Vec::new());
        {
            let mut capture = CapturingSink { inner: &mut inner, text: String::new() };
            capture.push("hel".to_string());
            capture.push("lo".to_string());
            assert_eq!(capture.text, "hello");
        }
        assert_eq!(inner.0, vec!["hel".to_string(), "lo".to_string()]);
    }
}
