use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::Job;
use crate::{StorageError, StorageGateway};

pub struct NewJob {
    pub agent_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub job_type: String,
    pub priority: i32,
    pub payload: JsonMap,
    pub max_retries: i32,
}

const SELECT_JOB: &str = r#"
    SELECT id, agent_id, session_id, type, status, priority, payload, result, error_message,
           retry_count, max_retries, available_at, created_at, updated_at, started_at, completed_at
    FROM jobs
"#;

impl StorageGateway {
    pub async fn enqueue_job(&self, new: NewJob) -> Result<Job, StorageError> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (agent_id, session_id, type, priority, payload, max_retries)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, agent_id, session_id, type, status, priority, payload, result, error_message,
                      retry_count, max_retries, available_at, created_at, updated_at, started_at, completed_at
            "#,
        )
        .bind(new.agent_id)
        .bind(new.session_id)
        .bind(&new.job_type)
        .bind(new.priority)
        .bind(new.payload)
        .bind(new.max_retries)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Current depth of unclaimed work, for enforcing the queue's
    /// high-water mark against actual backlog rather than concurrency.
    pub async fn count_queued_jobs(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM jobs WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Atomically selects the oldest highest-priority queued job whose
    /// `available_at` has passed and transitions it to `running`.
    /// `FOR UPDATE SKIP LOCKED` lets multiple workers poll concurrently
    /// without double-claiming or blocking on each other's row locks.
    pub async fn claim_job(&self) -> Result<Option<Job>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let candidate = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM jobs
            WHERE status = 'queued' AND available_at <= now()
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs SET status = 'running', started_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            select_columns()
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(row))
    }

    pub async fn complete_job(&self, id: Uuid, result: JsonMap) -> Result<(), StorageError> {
        let affected = sqlx::query(
            r#"
            UPDATE jobs SET status = 'succeeded', result = $2, completed_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StorageError::not_found("job", id));
        }
        Ok(())
    }

    /// On retriable failure under the retry budget, re-queues with a
    /// `base * 2^retry_count` backoff (capped); otherwise marks terminal.
    pub async fn fail_job(
        &self,
        id: Uuid,
        error_message: &str,
        retriable: bool,
        backoff_base_secs: u64,
        backoff_cap_secs: u64,
    ) -> Result<Job, StorageError> {
        let job = self.get_job(id).await?;
        if retriable && job.retry_count < job.max_retries {
            let delay = backoff_base_secs
                .saturating_mul(1u64 << job.retry_count.min(32) as u32)
                .min(backoff_cap_secs);
            let row = sqlx::query_as::<_, Job>(&format!(
                r#"
                UPDATE jobs
                SET status = 'queued', retry_count = retry_count + 1, error_message = $2,
                    available_at = now() + ($3 || ' seconds')::interval, updated_at = now()
                WHERE id = $1
                RETURNING {}
                "#,
                select_columns()
            ))
            .bind(id)
            .bind(error_message)
            .bind(delay.to_string())
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        } else {
            let row = sqlx::query_as::<_, Job>(&format!(
                r#"
                UPDATE jobs SET status = 'failed', error_message = $2, completed_at = now(), updated_at = now()
                WHERE id = $1
                RETURNING {}
                "#,
                select_columns()
            ))
            .bind(id)
            .bind(error_message)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job, StorageError> {
        sqlx::query_as::<_, Job>(&format!("{SELECT_JOB} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("job", id))
    }

    /// Reclaims jobs a crashed worker left in `running`: transitions rows
    /// whose `started_at` is older than `stuck_threshold_secs` back to
    /// `queued`, bumping `retry_count`.
    pub async fn sweep_stuck_jobs(&self, stuck_threshold_secs: u64) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', retry_count = retry_count + 1, updated_at = now()
            WHERE status = 'running'
              AND started_at < now() - ($1 || ' seconds')::interval
            "#,
        )
        .bind(stuck_threshold_secs.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn select_columns() -> &'static str {
    "id, agent_id, session_id, type, status, priority, payload, result, error_message, \
     retry_count, max_retries, available_at, created_at, updated_at, started_at, completed_at"
}
