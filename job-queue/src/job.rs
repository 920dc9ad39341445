use chrono::{DateTime, Duration, Utc};
use common::{error::AppError, storage::db::SurrealDbClient, stored_object};
use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Active,
    Retry,
    Completed,
    Failed,
}

stored_object!(Job, "job", {
    name: String,
    state: JobState,
    priority: i32,
    payload: Value,
    retry_count: u32,
    max_retries: u32,
    available_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    output: Option<Value>,
    error: Option<String>,
    singleton_key: Option<String>,
    worker_id: Option<String>
});

stored_object!(JobTransition, "job_transition", {
    job_id: String,
    from_state: JobState,
    to_state: JobState,
    note: Option<String>
});

const DEFAULT_MAX_RETRIES: u32 = 5;
const BACKOFF_BASE_SECONDS: i64 = 10;
const BACKOFF_CAP_SECONDS: i64 = 900;

pub struct EnqueueOptions {
    pub priority: i32,
    pub singleton_key: Option<String>,
    pub max_retries: u32,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            singleton_key: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Exponential backoff with jitter: `delay = min(cap, base * 2^retry_count) +- jitter`.
fn backoff_delay(retry_count: u32) -> Duration {
    let exp = BACKOFF_BASE_SECONDS.saturating_mul(1_i64.checked_shl(retry_count).unwrap_or(i64::MAX));
    let capped = exp.min(BACKOFF_CAP_SECONDS).max(BACKOFF_BASE_SECONDS);
    let jitter = rand::thread_rng().gen_range(0..=(capped / 4).max(1));
    Duration::seconds(capped - jitter)
}

async fn record_transition(
    job_id: &str,
    from_state: JobState,
    to_state: JobState,
    note: Option<String>,
    db: &SurrealDbClient,
) -> Result<(), AppError> {
    let now = Utc::now();
    db.store_item(JobTransition {
        id: Uuid::new_v4().to_string(),
        created_at: now,
        updated_at: now,
        job_id: job_id.to_string(),
        from_state,
        to_state,
        note,
    })
    .await?;
    Ok(())
}

impl Job {
    /// Enqueue a job by name with a JSON payload. If `singleton_key` is set
    /// and an active/created row for `(name, singleton_key)` already exists,
    /// that row's id is returned instead of creating a duplicate.
    pub async fn enqueue(
        name: &str,
        payload: Value,
        options: EnqueueOptions,
        db: &SurrealDbClient,
    ) -> Result<String, AppError> {
        if let Some(key) = &options.singleton_key {
            let existing: Vec<Job> = db
                .client
                .query(
                    "SELECT * FROM job WHERE name = $name AND singleton_key = $key \
                     AND state IN ['created', 'active', 'retry'] LIMIT 1",
                )
                .bind(("name", name.to_string()))
                .bind(("key", key.clone()))
                .await?
                .take(0)?;
            if let Some(job) = existing.into_iter().next() {
                return Ok(job.id);
            }
        }

        let now = Utc::now();
        let job = Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            state: JobState::Created,
            priority: options.priority,
            payload,
            retry_count: 0,
            max_retries: options.max_retries,
            available_at: now,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            singleton_key: options.singleton_key,
            worker_id: None,
        };
        let id = job.id.clone();
        db.store_item(job).await?;
        record_transition(&id, JobState::Created, JobState::Created, None, db).await?;
        Ok(id)
    }

    /// Claim up to `batch` eligible jobs of `name` for `worker_id`, transitioning
    /// them to `active`. Claims are made one at a time via a conditional
    /// `UPDATE ... WHERE state = 'created'` so concurrent workers never claim
    /// the same row twice.
    pub async fn fetch(
        name: &str,
        batch: usize,
        worker_id: &str,
        visibility_timeout: Duration,
        db: &SurrealDbClient,
    ) -> Result<Vec<Job>, AppError> {
        let candidates: Vec<Job> = db
            .client
            .query(
                "SELECT * FROM job WHERE name = $name AND state IN ['created', 'retry'] \
                 AND available_at <= time::now() ORDER BY priority DESC, created_at ASC LIMIT $batch",
            )
            .bind(("name", name.to_string()))
            .bind(("batch", batch as i64))
            .await?
            .take(0)?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let from_state = candidate.state.clone();
            let now = Utc::now();
            let visibility_deadline = now + visibility_timeout;
            let updated: Vec<Job> = db
                .client
                .query(
                    "UPDATE job SET state = 'active', started_at = $now, \
                     available_at = $deadline, worker_id = $worker_id \
                     WHERE id = $id AND state IN ['created', 'retry'] RETURN AFTER",
                )
                .bind(("id", format!("job:{}", candidate.id)))
                .bind(("now", now))
                .bind(("deadline", visibility_deadline))
                .bind(("worker_id", worker_id.to_string()))
                .await?
                .take(0)?;

            if let Some(job) = updated.into_iter().next() {
                record_transition(&job.id, from_state, JobState::Active, None, db).await?;
                claimed.push(job);
            }
        }

        Ok(claimed)
    }

    pub async fn complete(job_id: &str, output: Value, db: &SurrealDbClient) -> Result<(), AppError> {
        let mut job: Job = db
            .get_item(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;

        let from_state = job.state.clone();
        job.state = JobState::Completed;
        job.output = Some(output);
        job.completed_at = Some(Utc::now());
        job.updated_at = Utc::now();
        db.store_item(job).await?;

        record_transition(job_id, from_state, JobState::Completed, None, db).await?;
        Ok(())
    }

    /// Record a handler failure. `retryable = false` forces a terminal
    /// failure regardless of remaining retry budget.
    pub async fn fail(
        job_id: &str,
        error_info: &str,
        retryable: bool,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let mut job: Job = db
            .get_item(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound("job not found".to_string()))?;

        let from_state = job.state.clone();
        job.error = Some(error_info.to_string());
        job.updated_at = Utc::now();

        let terminal = !retryable || job.retry_count >= job.max_retries;
        if terminal {
            job.state = JobState::Failed;
            job.completed_at = Some(Utc::now());
        } else {
            job.retry_count += 1;
            job.state = JobState::Retry;
            job.available_at = Utc::now() + backoff_delay(job.retry_count);
            job.worker_id = None;
        }

        let to_state = job.state.clone();
        db.store_item(job).await?;
        record_transition(job_id, from_state, to_state, Some(error_info.to_string()), db).await?;
        Ok(())
    }

    /// Extend the visibility window for in-flight jobs. Jobs whose visibility
    /// has already lapsed are reverted to `created` with an incremented
    /// `retry_count` rather than heartbeated, matching C3's lapsed-visibility
    /// semantics.
    pub async fn heartbeat(
        worker_id: &str,
        job_ids: &[String],
        visibility_timeout: Duration,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let deadline = now + visibility_timeout;
        for job_id in job_ids {
            db.client
                .query(
                    "UPDATE job SET available_at = $deadline \
                     WHERE id = $id AND worker_id = $worker_id AND state = 'active'",
                )
                .bind(("id", format!("job:{job_id}")))
                .bind(("deadline", deadline))
                .bind(("worker_id", worker_id.to_string()))
                .await?;
        }
        Ok(())
    }

    /// Reclaim jobs whose visibility window lapsed (worker died mid-job):
    /// per C3, these revert directly to `created` (not `retry`) and bump
    /// `retry_count`, since the visibility timeout itself is the backoff.
    pub async fn reclaim_expired(db: &SurrealDbClient) -> Result<u64, AppError> {
        let expired: Vec<Job> = db
            .client
            .query("SELECT * FROM job WHERE state = 'active' AND available_at <= time::now()")
            .await?
            .take(0)?;

        let count = expired.len() as u64;
        for job in expired {
            let terminal = job.retry_count + 1 >= job.max_retries;
            let from_state = job.state.clone();
            let (to_state, available_at) = if terminal {
                (JobState::Failed, job.available_at)
            } else {
                (JobState::Created, Utc::now())
            };

            db.client
                .query(
                    "UPDATE job SET state = $state, retry_count = $retry_count, \
                     available_at = $available_at, worker_id = NONE WHERE id = $id",
                )
                .bind(("id", format!("job:{}", job.id)))
                .bind(("state", to_state.clone()))
                .bind(("retry_count", job.retry_count + 1))
                .bind(("available_at", available_at))
                .await?;

            record_transition(
                &job.id,
                from_state,
                to_state,
                Some("visibility timeout lapsed".to_string()),
                db,
            )
            .await?;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.apply_migrations().await.expect("migrations");
        db
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_for_singleton_key() {
        let db = test_db().await;
        let options = EnqueueOptions {
            singleton_key: Some("document_1".to_string()),
            ..Default::default()
        };
        let id1 = Job::enqueue("parse_document", serde_json::json!({"document_id": "document_1"}), options, &db)
            .await
            .expect("enqueue 1");

        let options2 = EnqueueOptions {
            singleton_key: Some("document_1".to_string()),
            ..Default::default()
        };
        let id2 = Job::enqueue("parse_document", serde_json::json!({"document_id": "document_1"}), options2, &db)
            .await
            .expect("enqueue 2");

        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn test_fetch_claims_and_complete() {
        let db = test_db().await;
        Job::enqueue(
            "parse_document",
            serde_json::json!({"document_id": "document_1"}),
            EnqueueOptions::default(),
            &db,
        )
        .await
        .expect("enqueue");

        let claimed = Job::fetch("parse_document", 10, "worker_1", Duration::minutes(10), &db)
            .await
            .expect("fetch");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].state, JobState::Active);

        Job::complete(&claimed[0].id, serde_json::json!({"chunks": 12}), &db)
            .await
            .expect("complete");

        let refetch = Job::fetch("parse_document", 10, "worker_2", Duration::minutes(10), &db)
            .await
            .expect("refetch");
        assert!(refetch.is_empty());
    }

    #[tokio::test]
    async fn test_fail_retries_then_terminates() {
        let db = test_db().await;
        let options = EnqueueOptions {
            max_retries: 1,
            ..Default::default()
        };
        let job_id = Job::enqueue("analyze_document", serde_json::json!({}), options, &db)
            .await
            .expect("enqueue");

        let claimed = Job::fetch("analyze_document", 1, "worker_1", Duration::minutes(10), &db)
            .await
            .expect("fetch");
        assert_eq!(claimed.len(), 1);

        Job::fail(&job_id, "provider timeout", true, &db)
            .await
            .expect("fail retryable");

        let job: Job = db.get_item(&job_id).await.expect("get").expect("exists");
        assert_eq!(job.state, JobState::Created);
        assert_eq!(job.retry_count, 1);

        let reclaimed = Job::fetch("analyze_document", 1, "worker_2", Duration::minutes(10), &db)
            .await
            .expect("fetch after retry");
        assert_eq!(reclaimed.len(), 1);

        Job::fail(&job_id, "unsupported format", true, &db)
            .await
            .expect("fail exceeding max retries");

        let job: Job = db.get_item(&job_id).await.expect("get").expect("exists");
        assert_eq!(job.state, JobState::Failed);
    }
}
