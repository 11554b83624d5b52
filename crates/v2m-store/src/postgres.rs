//! PostgreSQL job store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use v2m_models::{Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};
use crate::store::{clamp_list_limit, JobStore, PageCursor, StatusUpdate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY,
    source_url TEXT NOT NULL,
    platform TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    mp3_url TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at, id)";

const JOB_COLUMNS: &str =
    "id, source_url, platform, status, error, mp3_url, created_at, updated_at";

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables. `DATABASE_URL` is required.
    pub fn from_env() -> StoreResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| StoreError::ConnectionFailed("DATABASE_URL is required".into()))?;

        Ok(Self {
            database_url,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            ..Default::default()
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    source_url: String,
    platform: String,
    status: String,
    error: Option<String>,
    mp3_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("job {}: {}", row.id, e)))?;

        Ok(Job {
            id: JobId(row.id.to_string()),
            source_url: row.source_url,
            platform: row.platform,
            status,
            error: row.error,
            result_ref: row.mp3_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_jobs(rows: Vec<JobRow>) -> StoreResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// Job store backed by a PostgreSQL `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Connect and return a new store. Call `init` before first use.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::connect(&StoreConfig::from_env()?).await
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `jobs` table and its index if missing.
    pub async fn init(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(CREATED_AT_INDEX).execute(&self.pool).await?;
        info!("Job store schema ready");
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        let id = job
            .id
            .as_uuid()
            .ok_or_else(|| StoreError::Corrupt(format!("job id is not a uuid: {}", job.id)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, source_url, platform, status, error, mp3_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&job.source_url)
        .bind(&job.platform)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(&job.result_ref)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(job.id.as_str()));
        }
        debug!(job_id = %job.id, "Inserted job");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        // Non-uuid ids cannot exist in the table.
        let uuid = id.as_uuid().ok_or_else(|| StoreError::not_found(id.as_str()))?;

        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| StoreError::not_found(id.as_str()))?
            .try_into()
    }

    async fn list(&self, limit: i64) -> StoreResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(clamp_list_limit(Some(limit)))
        .fetch_all(&self.pool)
        .await?;

        rows_to_jobs(rows)
    }

    async fn list_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<&PageCursor>,
        page_size: i64,
    ) -> StoreResult<Vec<Job>> {
        let page_size = page_size.max(1);

        let rows: Vec<JobRow> = match after.and_then(|c| c.id.as_uuid().map(|u| (c, u))) {
            Some((cursor, cursor_id)) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {JOB_COLUMNS} FROM jobs
                    WHERE created_at < $1 AND (created_at, id) > ($2, $3)
                    ORDER BY created_at ASC, id ASC
                    LIMIT $4
                    "#
                ))
                .bind(cutoff)
                .bind(cursor.created_at)
                .bind(cursor_id)
                .bind(page_size)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {JOB_COLUMNS} FROM jobs
                    WHERE created_at < $1
                    ORDER BY created_at ASC, id ASC
                    LIMIT $2
                    "#
                ))
                .bind(cutoff)
                .bind(page_size)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows_to_jobs(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM jobs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> StoreResult<Job> {
        let uuid = id.as_uuid().ok_or_else(|| StoreError::not_found(id.as_str()))?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET status = $2, error = $3, mp3_url = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(uuid)
        .bind(update.status.as_str())
        .bind(&update.error)
        .bind(&update.result_ref)
        .fetch_optional(&self.pool)
        .await?;

        let job: Job = row.ok_or_else(|| StoreError::not_found(id.as_str()))?.try_into()?;
        debug!(job_id = %id, status = %job.status, "Updated job status");
        Ok(job)
    }

    async fn transition(
        &self,
        id: &JobId,
        from: &[JobStatus],
        update: StatusUpdate,
    ) -> StoreResult<Option<Job>> {
        let uuid = id.as_uuid().ok_or_else(|| StoreError::not_found(id.as_str()))?;
        let from: Vec<&str> = from.iter().map(JobStatus::as_str).collect();

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET status = $2, error = $3, mp3_url = $4, updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(uuid)
        .bind(update.status.as_str())
        .bind(&update.error)
        .bind(&update.result_ref)
        .bind(&from)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let job: Job = row.try_into()?;
                debug!(job_id = %id, status = %job.status, "Transitioned job status");
                Ok(Some(job))
            }
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM jobs WHERE id = $1)")
                        .bind(uuid)
                        .fetch_one(&self.pool)
                        .await?;
                if exists {
                    Ok(None)
                } else {
                    Err(StoreError::not_found(id.as_str()))
                }
            }
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
