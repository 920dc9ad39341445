use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use chrono::Duration;
use common::storage::db::SurrealDbClient;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::job::Job;

/// Per-job execution context passed to every handler.
#[derive(Clone)]
pub struct Context {
    pub org_id: String,
    pub deal_id: Option<String>,
    pub trace_id: String,
    pub cancel_signal: CancellationToken,
}

pub enum HandlerOutcome {
    Success(Value),
    Retryable(String),
    Terminal(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value, ctx: Context) -> HandlerOutcome;
}

struct Registration {
    handler: Arc<dyn JobHandler>,
    concurrency: Arc<Semaphore>,
}

/// Registers `(job_name -> handler)` pairs and dispatches claimed jobs up to
/// a global concurrency cap, with optional per-handler caps (e.g. analysis
/// limited to 4 simultaneous runs to bound LLM cost).
pub struct WorkerRuntime {
    db: Arc<SurrealDbClient>,
    worker_id: String,
    visibility_timeout: Duration,
    global_limit: Arc<Semaphore>,
    handlers: HashMap<String, Registration>,
    shutdown: CancellationToken,
}

impl WorkerRuntime {
    pub fn new(db: Arc<SurrealDbClient>, worker_id: String, visibility_timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            db,
            worker_id,
            visibility_timeout,
            global_limit: Arc::new(Semaphore::new(max_concurrency)),
            handlers: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn register(&mut self, job_name: &str, handler: Arc<dyn JobHandler>, per_handler_concurrency: usize) {
        self.handlers.insert(
            job_name.to_string(),
            Registration {
                handler,
                concurrency: Arc::new(Semaphore::new(per_handler_concurrency)),
            },
        );
    }

    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Poll loop: claim a small batch per registered job name, dispatch each
    /// onto a task bounded by the global and per-handler semaphores. Returns
    /// once `shutdown_signal()` is cancelled and all in-flight jobs finish.
    pub async fn run(&self, poll_interval: StdDuration) {
        let mut tasks = Vec::new();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            for (job_name, registration) in &self.handlers {
                let claimed = match Job::fetch(job_name, 4, &self.worker_id, self.visibility_timeout, &self.db).await {
                    Ok(jobs) => jobs,
                    Err(e) => {
                        error!("failed to fetch jobs for {job_name}: {e}");
                        continue;
                    }
                };

                for job in claimed {
                    let db = self.db.clone();
                    let handler = registration.handler.clone();
                    let global_permit = self.global_limit.clone();
                    let handler_permit = registration.concurrency.clone();
                    let cancel = self.shutdown.clone();

                    tasks.push(tokio::spawn(async move {
                        let _global = global_permit.acquire_owned().await;
                        let _handler_slot = handler_permit.acquire_owned().await;

                        let ctx = Context {
                            org_id: job
                                .payload
                                .get("org_id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            deal_id: job.payload.get("deal_id").and_then(Value::as_str).map(str::to_string),
                            trace_id: job.id.clone(),
                            cancel_signal: cancel,
                        };

                        info!("dispatching job {} ({})", job.id, job.name);
                        match handler.handle(job.payload.clone(), ctx).await {
                            HandlerOutcome::Success(output) => {
                                if let Err(e) = Job::complete(&job.id, output, &db).await {
                                    error!("failed to mark job {} complete: {e}", job.id);
                                }
                            }
                            HandlerOutcome::Retryable(reason) => {
                                warn!("job {} retryable failure: {reason}", job.id);
                                if let Err(e) = Job::fail(&job.id, &reason, true, &db).await {
                                    error!("failed to mark job {} retryable: {e}", job.id);
                                }
                            }
                            HandlerOutcome::Terminal(reason) => {
                                error!("job {} terminal failure: {reason}", job.id);
                                if let Err(e) = Job::fail(&job.id, &reason, false, &db).await {
                                    error!("failed to mark job {} failed: {e}", job.id);
                                }
                            }
                        }
                    }));
                }
            }

            tasks.retain(|t| !t.is_finished());
            tokio::time::sleep(poll_interval).await;
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}
