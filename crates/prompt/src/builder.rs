use agentrun_storage::{MemoryChunk, Message, MessageRole, Tool};

use crate::context::Context;

/// Composes the prompt string. Never includes `key_hash`,
/// `metadata.secrets`, or any field not named in its contract — only the
/// system prompt, the memory section, chronological history, the current
/// user message, and the tool instruction block.
pub struct PromptBuilder<'a> {
    system_prompt: &'a str,
    tools: &'a [Tool],
}

impl<'a> PromptBuilder<'a> {
    pub fn new(system_prompt: &'a str, tools: &'a [Tool]) -> Self {
        Self { system_prompt, tools }
    }

    pub fn build(&self, context: &Context, user_message: &str) -> String {
        let mut out = String::new();
        out.push_str(self.system_prompt);
        out.push_str("\n\n");
        out.push_str(&render_memory_section(&context.memory_chunks));
        out.push_str(&render_history(&context.messages));
        out.push_str("User: ");
        out.push_str(user_message);
        out.push('\n');
        out.push_str(&render_tool_instructions(self.tools));
        out
    }

    /// Second form, used after tool execution: appends the assistant's
    /// tool calls and their results before instructing the model to
    /// produce the user-visible answer.
    pub fn build_with_tool_results(
        &self,
        context: &Context,
        user_message: &str,
        assistant_tool_call_block: &str,
        tool_results: &[(String, String)],
    ) -> String {
        let mut out = self.build(context, user_message);
        out.push_str("\nAssistant: ");
        out.push_str(assistant_tool_call_block);
        out.push('\n');
        for (tool_call_id, content) in tool_results {
            out.push_str(&format!("Tool[{tool_call_id}]: {content}\n"));
        }
        out.push_str("\nProduce the final, user-visible answer using the tool results above.\n");
        out
    }
}

fn render_memory_section(chunks: &[MemoryChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let mut out = String::from("Relevant memory:\n");
    for chunk in chunks {
        out.push_str("- ");
        out.push_str(&chunk.content);
        out.push('\n');
    }
    out.push('\n');
    out
}

fn render_history(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let tag = match message.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            MessageRole::Tool => "Tool",
        };
        out.push_str(tag);
        out.push_str(": ");
        out.push_str(&message.content);
        out.push('\n');
    }
    out
}

fn render_tool_instructions(tools: &[Tool]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nAvailable tools:\n");
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    out.push_str(
        "\nTo call a tool, end your response with a fenced JSON code block named \
         `tool_calls` containing an array of {id, name, arguments} objects. \
         Omit it entirely if no tool call is needed.\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_storage::JsonMap;
    use chrono::Utc;
    use uuid::Uuid;

    fn tool(name: &str) -> Tool {
        Tool {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: "does a thing".to_string(),
            arg_schema: JsonMap::new(),
            handler_type: agentrun_storage::HandlerType::Sql,
            handler_config: JsonMap::new(),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn build_never_includes_secrets_field_name() {
        let builder = PromptBuilder::new("be helpful", &[]);
        let prompt = builder.build(&Context::default(), "hello");
        assert!(!prompt.contains("key_hash"));
        assert!(!prompt.contains("metadata.secrets"));
    }

    #[test]
    fn build_includes_tool_instructions_when_tools_present() {
        let tools = vec![tool("search")];
        let builder = PromptBuilder::new("be helpful", &tools);
        let prompt = builder.build(&Context::default(), "hello");
        assert!(prompt.contains("search"));
        assert!(prompt.contains("tool_calls"));
    }

    #[test]
    fn build_omits_tool_section_without_tools() {
        let builder = PromptBuilder::new("be helpful", &[]);
        let prompt = builder.build(&Context::default(), "hello");
        assert!(!prompt.contains("Available tools"));
    }
}
