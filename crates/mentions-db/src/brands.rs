//! Database operations for the `brands` and `skus` tables.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `brands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BrandRow {
    pub id: i64,
    pub external_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A row from the `skus` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SkuRow {
    pub id: i64,
    pub code: i64,
    pub brand_id: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Brands
// ---------------------------------------------------------------------------

/// Inserts a brand keyed by its catalog id, or returns the row that is
/// already there. A concurrent insert of the same brand is absorbed by the
/// unique constraint.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or lookup fails.
pub async fn insert_brand_if_absent(
    conn: &mut PgConnection,
    external_id: i64,
    name: &str,
) -> Result<BrandRow, DbError> {
    let inserted = sqlx::query_as::<_, BrandRow>(
        "INSERT INTO brands (external_id, name) VALUES ($1, $2) \
         ON CONFLICT (external_id) DO NOTHING \
         RETURNING id, external_id, name, created_at",
    )
    .bind(external_id)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        return Ok(row);
    }

    let row = sqlx::query_as::<_, BrandRow>(
        "SELECT id, external_id, name, created_at FROM brands WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the brand whose name matches `name`, ignoring case.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_brand_by_name(pool: &PgPool, name: &str) -> Result<Option<BrandRow>, DbError> {
    let row = sqlx::query_as::<_, BrandRow>(
        "SELECT id, external_id, name, created_at FROM brands \
         WHERE LOWER(name) = LOWER($1) \
         ORDER BY id \
         LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Skus
// ---------------------------------------------------------------------------

/// Returns the subset of `codes` that already have a `skus` row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn existing_sku_codes(
    conn: &mut PgConnection,
    codes: &[i64],
) -> Result<Vec<i64>, DbError> {
    let rows = sqlx::query_scalar::<_, i64>("SELECT code FROM skus WHERE code = ANY($1)")
        .bind(codes)
        .fetch_all(conn)
        .await?;

    Ok(rows)
}

/// Inserts a sku under `brand_id` unless the code is already stored.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_sku_if_absent(
    conn: &mut PgConnection,
    code: i64,
    brand_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO skus (code, brand_id) VALUES ($1, $2) \
         ON CONFLICT (code) DO NOTHING",
    )
    .bind(code)
    .bind(brand_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}
