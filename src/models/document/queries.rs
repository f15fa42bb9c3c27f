use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::types::*;
use crate::errors::AppError;
use crate::models::user::escape_like;

const SELECT_DOCUMENT: &str = "\
    SELECT d.id, d.title, d.content, d.file_url, d.file_type, d.file_size, d.category, d.tags, \
           d.creator_id, COALESCE(NULLIF(u.name, ''), u.username, '') AS creator_name, \
           d.department, d.status, d.access_level, d.shared_with, d.approval_status, \
           d.approved_by, d.approval_date, d.version, d.created_at, d.updated_at \
    FROM documents d \
    LEFT JOIN users u ON u.id = d.creator_id";

/// Insert a document owned by `creator_id`. Returns the new id.
pub async fn create(
    pool: &PgPool,
    creator_id: i64,
    department: &str,
    input: &DocumentInput,
) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO documents \
             (title, content, file_url, file_type, file_size, category, tags, creator_id, \
              department, status, access_level, shared_with) \
         VALUES ($1, COALESCE($2, ''), COALESCE($3, ''), COALESCE($4, ''), COALESCE($5, 0), \
                 COALESCE($6, 'other'), COALESCE($7, '{}'), $8, $9, COALESCE($10, 'draft'), \
                 COALESCE($11, 'department'), COALESCE($12, '{}')) \
         RETURNING id",
    )
    .bind(input.title.as_deref().map(str::trim).unwrap_or_default())
    .bind(&input.content)
    .bind(&input.file_url)
    .bind(&input.file_type)
    .bind(input.file_size)
    .bind(&input.category)
    .bind(&input.tags)
    .bind(creator_id)
    .bind(department)
    .bind(&input.status)
    .bind(&input.access_level)
    .bind(&input.shared_with)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Document>, AppError> {
    let sql = format!("{SELECT_DOCUMENT} WHERE d.id = $1");
    let doc = sqlx::query_as::<_, Document>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(doc)
}

/// Documents visible to a viewer, newest first.
///
/// `viewer = None` means an administrator: every document is returned.
/// Otherwise the same rule as [`Document::is_visible_to`] is applied in SQL.
pub async fn find_visible(
    pool: &PgPool,
    viewer: Option<(i64, &str)>,
    filter: &DocumentFilter,
) -> Result<Vec<Document>, AppError> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let sql = format!(
        "{SELECT_DOCUMENT} \
         WHERE ($1::BIGINT IS NULL \
                OR d.creator_id = $1 \
                OR d.access_level = 'public' \
                OR $1 = ANY(d.shared_with) \
                OR (d.access_level = 'department' AND d.department <> '' AND d.department = $2)) \
           AND ($3::TEXT IS NULL OR d.title ILIKE $3) \
           AND ($4::TEXT IS NULL OR d.category = $4) \
         ORDER BY d.updated_at DESC, d.id DESC"
    );

    let docs = sqlx::query_as::<_, Document>(&sql)
        .bind(viewer.map(|(id, _)| id))
        .bind(viewer.map(|(_, dept)| dept).unwrap_or(""))
        .bind(&pattern)
        .bind(&filter.category)
        .fetch_all(pool)
        .await?;
    Ok(docs)
}

/// Partial update. A change to content or file bumps the document version.
/// Returns false if the document does not exist.
pub async fn update(pool: &PgPool, id: i64, input: &DocumentInput) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE documents SET \
             version = CASE WHEN ($3::TEXT IS NOT NULL AND $3 IS DISTINCT FROM content) \
                              OR ($4::TEXT IS NOT NULL AND $4 IS DISTINCT FROM file_url) \
                            THEN version + 1 ELSE version END, \
             title        = COALESCE($2, title), \
             content      = COALESCE($3, content), \
             file_url     = COALESCE($4, file_url), \
             file_type    = COALESCE($5, file_type), \
             file_size    = COALESCE($6, file_size), \
             category     = COALESCE($7, category), \
             tags         = COALESCE($8, tags), \
             status       = COALESCE($9, status), \
             access_level = COALESCE($10, access_level), \
             shared_with  = COALESCE($11, shared_with), \
             updated_at   = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(input.title.as_deref().map(str::trim))
    .bind(&input.content)
    .bind(&input.file_url)
    .bind(&input.file_type)
    .bind(input.file_size)
    .bind(&input.category)
    .bind(&input.tags)
    .bind(&input.status)
    .bind(&input.access_level)
    .bind(&input.shared_with)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Mirror a workflow outcome onto the document. Runs on the caller's
/// connection so it can share the instance write's transaction.
pub async fn set_approval_status(
    conn: &mut PgConnection,
    id: i64,
    status: ApprovalStatus,
    approved_by: Option<i64>,
    approval_date: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE documents \
         SET approval_status = $2, approved_by = $3, approval_date = $4, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(approved_by)
    .bind(approval_date)
    .execute(conn)
    .await?;
    Ok(())
}
