use std::sync::Arc;
use std::time::Duration;

use agentrun_config::AppConfig;
use agentrun_exec::ToolInvoker;
use agentrun_llm::LlmClient;
use agentrun_memory::MemoryManager;
use agentrun_prompt::ContextAssembler;
use agentrun_runtime::{Authenticator, DrainTracker, JobQueue, RateLimiter, SessionLocks, TurnOrchestrator};
use agentrun_storage::StorageGateway;
use agentrun_tools::ToolRegistry;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageGateway,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub tool_registry: Arc<ToolRegistry>,
    pub authenticator: Arc<Authenticator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub job_queue: Arc<JobQueue>,
    pub drain: DrainTracker,
    pub config: Arc<AppConfig>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub async fn build(storage: StorageGateway, config: AppConfig, metrics_handle: PrometheusHandle) -> anyhow::Result<Self> {
        let tool_registry = Arc::new(ToolRegistry::new());
        tool_registry.refresh(&storage).await?;

        let llm = LlmClient::new(storage.clone());
        let memory = MemoryManager::new(storage.clone(), llm.clone());
        let context_assembler = ContextAssembler::new(storage.clone(), llm.clone(), memory.clone());
        let tool_invoker = ToolInvoker::new(storage.clone(), tool_registry.clone());
        let session_locks = Arc::new(SessionLocks::new());
        let drain = DrainTracker::new();

        let orchestrator = Arc::new(TurnOrchestrator::new(
            storage.clone(),
            llm,
            context_assembler,
            tool_invoker,
            tool_registry.clone(),
            Arc::new(memory),
            session_locks,
            drain.clone(),
            config.runtime.recent_messages_limit as i64,
            config.runtime.memory_recall_limit as i64,
            Duration::from_secs(config.runtime.memory_writeback_deadline_secs),
        ));

        let job_queue = Arc::new(JobQueue::new(storage.clone(), config.runtime.job_backoff_base_secs));

        Ok(Self {
            authenticator: Arc::new(Authenticator::new(storage.clone())),
            rate_limiter: Arc::new(RateLimiter::new()),
            storage,
            orchestrator,
            tool_registry,
            job_queue,
            drain,
            config: Arc::new(config),
            metrics_handle,
        })
    }
}
