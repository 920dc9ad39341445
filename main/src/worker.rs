use std::{sync::Arc, time::Duration as StdDuration};

use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use job_queue::{EnqueueOptions, Job};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RETENTION_SWEEP_SINGLETON_KEY: &str = "checkpoint_retention_sweep:daily";
const RETENTION_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(24 * 60 * 60);
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.apply_migrations().await?;

    let storage = Arc::new(StorageManager::new(&config).await?);
    let (mut runtime, _deps) = ingestion_pipeline::build_runtime(&config, db.clone(), storage);
    checkpointer::register_handlers(&mut runtime, db.clone());

    tokio::spawn(schedule_retention_sweeps(db.clone()));

    info!("Starting worker process");
    ingestion_pipeline::run_worker(runtime, POLL_INTERVAL).await?;

    Ok(())
}

/// §4.9's retention sweep has no natural per-thread trigger, so it's kept
/// alive by a recurring singleton-keyed enqueue rather than a one-off job:
/// re-enqueuing under the same key is a no-op while a prior sweep is still
/// queued or running.
async fn schedule_retention_sweeps(db: Arc<SurrealDbClient>) {
    loop {
        if let Err(err) = Job::enqueue(
            "checkpoint_retention_sweep",
            json!({}),
            EnqueueOptions { singleton_key: Some(RETENTION_SWEEP_SINGLETON_KEY.to_string()), ..Default::default() },
            &db,
        )
        .await
        {
            error!(error = %err, "failed to enqueue checkpoint retention sweep");
        }
        tokio::time::sleep(RETENTION_SWEEP_INTERVAL).await;
    }
}
