mod error;
mod middleware;
mod routes;
mod state;
mod ws;

use std::time::Duration;

use agentrun_config::AppConfig;
use agentrun_runtime::run_worker;
use agentrun_storage::StorageGateway;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = AppConfig::load()?;
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let storage = StorageGateway::connect(
        &config.database.connection_url(),
        config.database.max_open_conns,
        config.database.max_idle_conns,
        config.database.conn_max_lifetime_secs,
    )
    .await?;

    let state = AppState::build(storage, config.clone(), metrics_handle).await?;

    let (worker_shutdown_tx, worker_shutdown_rx) = tokio::sync::oneshot::channel();
    let job_queue = state.job_queue.clone();
    let job_orchestrator = state.orchestrator.clone();
    let poll_interval = Duration::from_secs(config.runtime.job_poll_interval_secs);
    let stuck_threshold = config.runtime.job_stuck_threshold_secs;
    let worker_handle = tokio::spawn(async move {
        run_worker(
            job_queue,
            poll_interval,
            move |job| {
                let orchestrator = job_orchestrator.clone();
                async move { handle_job(orchestrator, job).await }
            },
            worker_shutdown_rx,
        )
        .await;
    });

    let sweeper_queue = state.job_queue.clone();
    let sweeper_interval = Duration::from_secs(stuck_threshold.max(30));
    let sweeper_handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweeper_interval).await;
            if let Err(e) = sweeper_queue.sweep_stuck(stuck_threshold).await {
                tracing::warn!(error = %e, "stuck-job sweep failed");
            }
        }
    });

    let drain = state.drain.clone();
    let shutdown_drain_secs = config.runtime.shutdown_drain_secs;
    let app = routes::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "agentrun-server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = worker_shutdown_tx.send(());
    sweeper_handle.abort();
    if !drain.wait(Duration::from_secs(shutdown_drain_secs)).await {
        tracing::warn!("shutdown proceeding before all memory write-backs finished draining");
    }
    let _ = worker_handle.await;

    Ok(())
}

/// Dispatches a claimed job by `job_type`. `run_turn` is the only type with
/// a real handler today — it runs the same turn logic the synchronous
/// `/sessions/{id}/messages` endpoint uses, against the `session_id` and
/// `content` carried on the job row. Any other `job_type` fails with a
/// clear, non-retriable-looking message rather than silently succeeding.
async fn handle_job(
    orchestrator: std::sync::Arc<agentrun_runtime::TurnOrchestrator>,
    job: agentrun_storage::Job,
) -> Result<agentrun_storage::JsonMap, String> {
    match job.job_type.as_str() {
        "run_turn" => {
            let session_id = job.session_id.ok_or_else(|| "run_turn job missing session_id".to_string())?;
            let content = job
                .payload
                .get("content")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "run_turn job missing payload.content".to_string())?;
            let outcome = orchestrator.run_turn(session_id, content).await.map_err(|e| e.to_string())?;
            let mut result = agentrun_storage::JsonMap::new();
            result.insert("content".to_string(), serde_json::Value::String(outcome.content));
            result.insert("prompt_tokens".to_string(), serde_json::Value::from(outcome.tokens_used.prompt));
            result.insert("completion_tokens".to_string(), serde_json::Value::from(outcome.tokens_used.completion));
            Ok(result)
        }
        other => {
            tracing::warn!(job_id = %job.id, job_type = %other, "no handler registered for this job type");
            Err(format!("unhandled job type: {other}"))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
