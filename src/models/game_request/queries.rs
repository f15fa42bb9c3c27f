use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use super::types::*;
use crate::errors::AppError;
use crate::models::user;

#[derive(sqlx::FromRow)]
struct GameRequestRow {
    id: i64,
    sender_id: i64,
    receivers: Vec<i64>,
    game_name: String,
    message: String,
    status: String,
    scheduled_time: Option<DateTime<Utc>>,
    responses: Json<Vec<GameResponse>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GameRequestRow> for GameRequest {
    fn from(row: GameRequestRow) -> Self {
        GameRequest {
            id: row.id,
            sender: row.sender_id,
            receivers: row.receivers,
            game_name: row.game_name,
            message: row.message,
            status: row.status,
            scheduled_time: row.scheduled_time,
            responses: row.responses.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_REQUEST: &str = "\
    SELECT id, sender_id, receivers, game_name, message, status, scheduled_time, responses, \
           created_at, updated_at \
    FROM game_requests";

pub async fn create(pool: &PgPool, sender_id: i64, input: &GameRequestInput) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO game_requests (sender_id, receivers, game_name, message, scheduled_time) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id",
    )
    .bind(sender_id)
    .bind(input.distinct_receivers())
    .bind(input.game_name.trim())
    .bind(input.message.trim())
    .bind(input.scheduled_time)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<GameRequest>, AppError> {
    let sql = format!("{SELECT_REQUEST} WHERE id = $1");
    let row = sqlx::query_as::<_, GameRequestRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(GameRequest::from))
}

async fn find_where(pool: &PgPool, condition: &str, user_id: Option<i64>) -> Result<Vec<GameRequest>, AppError> {
    let sql = format!("{SELECT_REQUEST} WHERE {condition} ORDER BY created_at DESC, id DESC");
    let rows = sqlx::query_as::<_, GameRequestRow>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(GameRequest::from).collect())
}

/// Requests sent by `user_id`, or every request when `None`.
pub async fn find_sent(pool: &PgPool, user_id: Option<i64>) -> Result<Vec<GameRequest>, AppError> {
    find_where(pool, "$1::BIGINT IS NULL OR sender_id = $1", user_id).await
}

/// Requests addressed to `user_id`, or every request when `None`.
pub async fn find_received(pool: &PgPool, user_id: Option<i64>) -> Result<Vec<GameRequest>, AppError> {
    find_where(pool, "$1::BIGINT IS NULL OR $1 = ANY(receivers)", user_id).await
}

pub async fn find_all(pool: &PgPool) -> Result<Vec<GameRequest>, AppError> {
    find_sent(pool, None).await
}

/// Per-status counts on both sides. `None` counts every request.
pub async fn statistics(pool: &PgPool, user_id: Option<i64>) -> Result<GameRequestStatistics, AppError> {
    let counts = |condition: &str| {
        format!(
            "SELECT \
                 COUNT(*) AS total, \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
                 COUNT(*) FILTER (WHERE status = 'accepted') AS accepted, \
                 COUNT(*) FILTER (WHERE status = 'rejected') AS rejected, \
                 COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled \
             FROM game_requests WHERE {condition}"
        )
    };

    let sent = sqlx::query_as::<_, StatusCounts>(&counts("$1::BIGINT IS NULL OR sender_id = $1"))
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    let received = sqlx::query_as::<_, StatusCounts>(&counts("$1::BIGINT IS NULL OR $1 = ANY(receivers)"))
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(GameRequestStatistics { sent, received })
}

/// Load a request with a row lock held until the caller's transaction ends.
pub async fn find_for_update(conn: &mut PgConnection, id: i64) -> Result<Option<GameRequest>, AppError> {
    let sql = format!("{SELECT_REQUEST} WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, GameRequestRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(GameRequest::from))
}

/// Write back status, schedule and responses.
pub async fn save(conn: &mut PgConnection, request: &GameRequest) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE game_requests \
         SET status = $2, scheduled_time = $3, responses = $4, updated_at = now() \
         WHERE id = $1",
    )
    .bind(request.id)
    .bind(&request.status)
    .bind(request.scheduled_time)
    .bind(Json(&request.responses))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark a request cancelled. Returns false if it was already cancelled or missing.
pub async fn cancel(pool: &PgPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE game_requests SET status = 'cancelled', updated_at = now() \
         WHERE id = $1 AND status <> 'cancelled'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Attach sender and receiver references.
pub async fn expand(pool: &PgPool, requests: Vec<GameRequest>) -> Result<Vec<GameRequestView>, AppError> {
    let mut ids: Vec<i64> = requests
        .iter()
        .flat_map(|r| std::iter::once(r.sender).chain(r.receivers.iter().copied()))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let users: HashMap<i64, _> = user::find_refs(pool, &ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(requests
        .into_iter()
        .map(|request| GameRequestView {
            sender_info: users.get(&request.sender).cloned(),
            receiver_info: request.receivers.iter().filter_map(|id| users.get(id).cloned()).collect(),
            request,
        })
        .collect())
}
