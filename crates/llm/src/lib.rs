//! Embedding and generation client: a thin wrapper over the DB-side SQL
//! primitives (`embed`, `llm_generate`, `llm_generate_stream`) the
//! storage layer exposes. This crate never calls out to a model provider
//! itself — the database is the integration point — so its job is
//! shaping inputs, extracting structured results from each function's
//! row shape, and the batch-then-fallback and token-estimate policies
//! that contract doesn't specify.

use std::collections::HashMap;

use agentrun_storage::StorageGateway;
use futures::StreamExt;
use serde_json::Value;
use sqlx::Row;

mod error;
mod stream;

pub use error::{EmbedBatchError, LlmError};
pub use stream::StreamSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn sum(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt + other.prompt,
            completion: self.completion + other.completion,
            total: self.total + other.total,
        }
    }
}

/// Free-form hyperparameter map, narrowed to the fields the provider
/// actually understands. Unknown keys are ignored, not rejected.
#[derive(Debug, Clone, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub top_p: Option<f32>,
}

impl GenerationConfig {
    pub fn from_map(map: &HashMap<String, Value>) -> Self {
        Self {
            temperature: map.get("temperature").and_then(Value::as_f64).map(|v| v as f32),
            max_tokens: map.get("max_tokens").and_then(Value::as_i64).map(|v| v as i32),
            top_p: map.get("top_p").and_then(Value::as_f64).map(|v| v as f32),
        }
    }
}

/// `ceil(len(text)/4)` — a fixed heuristic used only when the provider
/// doesn't report token counts. The constant is a tuning knob, not a
/// contract any caller should depend on.
pub fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() + 3) / 4) as u32
}

#[derive(Clone)]
pub struct LlmClient {
    storage: StorageGateway,
}

impl LlmClient {
    pub fn new(storage: StorageGateway) -> Self {
        Self { storage }
    }

    /// `Embed(text, model) → vector`. A parse failure attaches the model
    /// name and a truncated preview of the offending payload.
    pub async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, LlmError> {
        let row = sqlx::query("SELECT embed($1, $2)::text AS vec")
            .bind(text)
            .bind(model)
            .fetch_one(self.storage.pool())
            .await
            .map_err(|e| LlmError::Embedding {
                model: model.to_string(),
                preview: preview(text),
                source: e.to_string(),
            })?;
        let raw: String = row.try_get("vec").map_err(|e| LlmError::Embedding {
            model: model.to_string(),
            preview: preview(text),
            source: e.to_string(),
        })?;
        agentrun_storage::vector::parse_vector(&raw).map_err(|e| LlmError::Embedding {
            model: model.to_string(),
            preview: preview(text),
            source: e.to_string(),
        })
    }

    /// Tries the batch primitive first; on any failure (including the
    /// function not existing on this database), falls back to per-text
    /// calls. A fallback failure reports the index of the failing text.
    pub async fn embed_batch(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, EmbedBatchError> {
        match self.embed_batch_primitive(texts, model).await {
            Ok(vectors) => Ok(vectors),
            Err(_) => {
                let mut out = Vec::with_capacity(texts.len());
                for (index, text) in texts.iter().enumerate() {
                    let vector = self
                        .embed(text, model)
                        .await
                        .map_err(|source| EmbedBatchError { index, source })?;
                    out.push(vector);
                }
                Ok(out)
            }
        }
    }

    async fn embed_batch_primitive(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>, LlmError> {
        let rows = sqlx::query("SELECT vec::text AS vec FROM embed_batch($1, $2) AS vec")
            .bind(texts)
            .bind(model)
            .fetch_all(self.storage.pool())
            .await
            .map_err(|e| LlmError::Embedding {
                model: model.to_string(),
                preview: preview(texts.first().map(String::as_str).unwrap_or("")),
                source: e.to_string(),
            })?;
        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("vec").map_err(|e| LlmError::Embedding {
                    model: model.to_string(),
                    preview: String::new(),
                    source: e.to_string(),
                })?;
                agentrun_storage::vector::parse_vector(&raw).map_err(|e| LlmError::Embedding {
                    model: model.to_string(),
                    preview: String::new(),
                    source: e.to_string(),
                })
            })
            .collect()
    }

    /// `Generate(prompt, model, cfg) → (text, TokenUsage)`. Estimates
    /// usage with the word-count heuristic if the provider omits it.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        cfg: &GenerationConfig,
    ) -> Result<(String, TokenUsage), LlmError> {
        let row = sqlx::query(
            "SELECT content, prompt_tokens, completion_tokens FROM llm_generate($1, $2, $3, $4, $5)",
        )
        .bind(prompt)
        .bind(model)
        .bind(cfg.temperature)
        .bind(cfg.max_tokens)
        .bind(cfg.top_p)
        .fetch_one(self.storage.pool())
        .await
        .map_err(|e| LlmError::Generation { model: model.to_string(), source: e.to_string() })?;

        let content: String = row
            .try_get("content")
            .map_err(|e| LlmError::Generation { model: model.to_string(), source: e.to_string() })?;
        let prompt_tokens: Option<i32> = row.try_get("prompt_tokens").unwrap_or(None);
        let completion_tokens: Option<i32> = row.try_get("completion_tokens").unwrap_or(None);

        let usage = TokenUsage {
            prompt: prompt_tokens.map(|v| v as u32).unwrap_or_else(|| estimate_tokens(prompt)),
            completion: completion_tokens.map(|v| v as u32).unwrap_or_else(|| estimate_tokens(&content)),
            total: 0,
        };
        let usage = TokenUsage { total: usage.prompt + usage.completion, ..usage };
        Ok((content, usage))
    }

    /// Streams partial tokens into `sink`. The sink is assumed to be
    /// single-consumer, same as the underlying set-returning function's
    /// row stream.
    pub async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
        cfg: &GenerationConfig,
        sink: &mut dyn StreamSink,
    ) -> Result<TokenUsage, LlmError> {
        let mut rows = sqlx::query(
            "SELECT chunk, is_final, prompt_tokens, completion_tokens FROM llm_generate_stream($1, $2, $3, $4, $5)",
        )
        .bind(prompt)
        .bind(model)
        .bind(cfg.temperature)
        .bind(cfg.max_tokens)
        .bind(cfg.top_p)
        .fetch(self.storage.pool());

        let mut usage = TokenUsage::default();
        let mut completion_text = String::new();
        while let Some(row) = rows.next().await {
            let row = row.map_err(|e| LlmError::Generation { model: model.to_string(), source: e.to_string() })?;
            let chunk: String = row.try_get("chunk").unwrap_or_default();
            completion_text.push_str(&chunk);
            sink.push(chunk);
            if let Ok(Some(p)) = row.try_get::<Option<i32>, _>("prompt_tokens") {
                usage.prompt = p as u32;
            }
            if let Ok(Some(c)) = row.try_get::<Option<i32>, _>("completion_tokens") {
                usage.completion = c as u32;
            }
        }
        if usage.prompt == 0 {
            usage.prompt = estimate_tokens(prompt);
        }
        if usage.completion == 0 {
            usage.completion = estimate_tokens(&completion_text);
        }
        usage.total = usage.prompt + usage.completion;
        Ok(usage)
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn generation_config_ignores_unknown_keys() {
        let map: HashMap<String, Value> = serde_json::from_value(serde_json::json!({
            "temperature": 0.7,
            "max_tokens": 512,
            "frobnicate": true
        }))
        .unwrap();
        let cfg = GenerationConfig::from_map(&map);
        assert_eq!(cfg.temperature, Some(0.7));
        assert_eq!(cfg.max_tokens, Some(512));
        assert_eq!(cfg.top_p, None);
    }

    #[test]
    fn token_usage_sums_fields() {
        let a = TokenUsage { prompt: 10, completion: 5, total: 15 };
        let b = TokenUsage { prompt: 1, completion: 2, total: 3 };
        let summed = a.sum(b);
        assert_eq!(summed.prompt, 11);
        assert_eq!(summed.completion, 7);
        assert_eq!(summed.total, 18);
    }
}
