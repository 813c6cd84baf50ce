//! Database operations for `crawl_runs`, the ledger of orchestrated crawls.
//!
//! A run moves `queued -> running -> succeeded | failed`; any other move is
//! rejected with [`DbError::InvalidCrawlRunTransition`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Which crawl a run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlKind {
    Live,
    Directory,
    Category,
}

impl CrawlKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlKind::Live => "live",
            CrawlKind::Directory => "directory",
            CrawlKind::Category => "category",
        }
    }
}

/// A row from the `crawl_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CrawlRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, \
     started_at, completed_at, records_processed, error_message, created_at";

/// Creates a run in `queued` status and returns it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_crawl_run(
    pool: &PgPool,
    kind: CrawlKind,
    trigger_source: &str,
) -> Result<CrawlRunRow, DbError> {
    let row = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "INSERT INTO crawl_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(kind.as_str())
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Applies `assignments` to run `id` if it is currently in `from`.
async fn transition(
    pool: &PgPool,
    id: i64,
    from: &'static str,
    assignments: &str,
    bind_value: Option<BindValue<'_>>,
) -> Result<(), DbError> {
    let sql = format!("UPDATE crawl_runs SET {assignments} WHERE id = $1 AND status = '{from}'");
    let query = sqlx::query(&sql).bind(id);
    let query = match bind_value {
        Some(BindValue::Int(v)) => query.bind(v),
        Some(BindValue::Text(v)) => query.bind(v),
        None => query,
    };
    let result = query.execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCrawlRunTransition {
            id,
            expected_status: from,
        });
    }
    Ok(())
}

enum BindValue<'a> {
    Int(i32),
    Text(&'a str),
}

/// Marks a queued run as `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not queued.
pub async fn start_crawl_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    transition(
        pool,
        id,
        "queued",
        "status = 'running', started_at = NOW()",
        None,
    )
    .await
}

/// Marks a running run as `succeeded` with its record count.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not running.
pub async fn complete_crawl_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
) -> Result<(), DbError> {
    transition(
        pool,
        id,
        "running",
        "status = 'succeeded', completed_at = NOW(), records_processed = $2",
        Some(BindValue::Int(records_processed)),
    )
    .await
}

/// Marks a running run as `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidCrawlRunTransition`] if the run is not running.
pub async fn fail_crawl_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    transition(
        pool,
        id,
        "running",
        "status = 'failed', completed_at = NOW(), error_message = $2",
        Some(BindValue::Text(error_message)),
    )
    .await
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this id.
pub async fn get_crawl_run(pool: &PgPool, id: i64) -> Result<CrawlRunRow, DbError> {
    sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_crawl_runs(pool: &PgPool, limit: i64) -> Result<Vec<CrawlRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CrawlRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM crawl_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
