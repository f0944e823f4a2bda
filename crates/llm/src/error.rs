#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("embedding failed for model '{model}' (payload preview: {preview:?}): {source}")]
    Embedding { model: String, preview: String, source: String },

    #[error("generation failed for model '{model}': {source}")]
    Generation { model: String, source: String },
}

/// `EmbedBatch` fallback failure: which text in the batch failed.
#[derive(Debug, thiserror::Error)]
#[error("embed_batch fallback failed at index {index}: {source}")]
pub struct EmbedBatchError {
    pub index: usize,
    pub source: LlmError,
}
