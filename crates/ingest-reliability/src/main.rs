use std::sync::Arc;

use anyhow::Result;
use ingest_reliability::{
    Collaborators, ControllerConfig, InMemoryTaskQueue, IngestTask, ReliabilityController,
    StaticServiceHealth, SystemResourceMonitor,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Number of demo tasks seeded into the in-memory queue at startup
const SEED_TASKS_ENV: &str = "INGEST_SEED_TASKS";

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest_reliability=info,ingest_reliability_host=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ingest-reliability-host starting...");

    let config = ControllerConfig::load();
    tracing::info!(
        rate = config.initial_rate,
        burst = config.burst_size,
        workers = config.initial_workers,
        retry_budget = config.retry_budget,
        "Controller configured"
    );

    let queue = Arc::new(InMemoryTaskQueue::default());
    let resources = SystemResourceMonitor::new()
        .with_limits(config.thresholds.memory_percent, config.thresholds.cpu_percent);

    let controller = ReliabilityController::new(
        config,
        Collaborators {
            queue: queue.clone(),
            resources: Arc::new(resources),
            service_health: Arc::new(StaticServiceHealth::healthy()),
            processor: Arc::new(|task: &IngestTask| -> Result<(), String> {
                tracing::info!(task_id = %task.id, task_type = %task.task_type, "Ingesting");
                Ok(())
            }),
        },
    );

    let seed: usize = std::env::var(SEED_TASKS_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    for n in 0..seed {
        queue.enqueue(IngestTask::new("demo", serde_json::json!({ "seq": n })))?;
    }
    if seed > 0 {
        tracing::info!(tasks = seed, "Seeded demo tasks");
    }

    controller.start().await?;
    tracing::info!("Controller ready, waiting for shutdown signal...");
    tokio::signal::ctrl_c().await?;

    controller.stop().await?;
    tracing::info!(
        status = %serde_json::to_string(&controller.status())?,
        dead_letters = queue.dead_letter_count(),
        "Host shutdown complete"
    );
    Ok(())
}
