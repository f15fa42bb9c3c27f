use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use super::types::*;
use crate::errors::AppError;
use crate::models::page_window;
use crate::models::user::{self, escape_like};

const SELECT_APPOINTMENT: &str = "\
    SELECT id, game, time, description, creator_id, participants, created_at, updated_at \
    FROM appointments";

/// Insert an appointment; the creator joins it immediately.
pub async fn create(pool: &PgPool, creator_id: i64, input: &AppointmentInput) -> Result<i64, AppError> {
    let time = input
        .time
        .ok_or_else(|| AppError::InvalidArgument("Time is required".to_string()))?;
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO appointments (game, time, description, creator_id, participants) \
         VALUES ($1, $2, $3, $4, ARRAY[$4]::BIGINT[]) \
         RETURNING id",
    )
    .bind(input.game.trim())
    .bind(time)
    .bind(input.description.trim())
    .bind(creator_id)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Appointment>, AppError> {
    let sql = format!("{SELECT_APPOINTMENT} WHERE id = $1");
    let appointment = sqlx::query_as::<_, Appointment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(appointment)
}

/// One page of appointments ordered by time, plus the total match count.
pub async fn find_paginated(
    pool: &PgPool,
    filter: &AppointmentFilter,
    now: DateTime<Utc>,
    page: i64,
    per_page: i64,
) -> Result<(Vec<Appointment>, i64), AppError> {
    let (_, per_page, offset) = page_window(page, per_page);
    let pattern = filter
        .game
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));
    let upcoming_after = filter.upcoming.then_some(now);

    let condition = "($1::TEXT IS NULL OR game ILIKE $1) AND ($2::TIMESTAMPTZ IS NULL OR time > $2)";

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM appointments WHERE {condition}"))
        .bind(&pattern)
        .bind(upcoming_after)
        .fetch_one(pool)
        .await?;

    let sql = format!("{SELECT_APPOINTMENT} WHERE {condition} ORDER BY time ASC, id ASC LIMIT $3 OFFSET $4");
    let items = sqlx::query_as::<_, Appointment>(&sql)
        .bind(&pattern)
        .bind(upcoming_after)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((items, total))
}

/// Appointments a user created, joined, or either, ordered by time.
pub async fn find_for_user(
    pool: &PgPool,
    user_id: i64,
    involvement: Involvement,
) -> Result<Vec<Appointment>, AppError> {
    let condition = match involvement {
        Involvement::All => "creator_id = $1 OR $1 = ANY(participants)",
        Involvement::Created => "creator_id = $1",
        Involvement::Joined => "$1 = ANY(participants)",
    };
    let sql = format!("{SELECT_APPOINTMENT} WHERE {condition} ORDER BY time ASC, id ASC");
    let items = sqlx::query_as::<_, Appointment>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(items)
}

/// The next `limit` appointments the user takes part in.
pub async fn find_upcoming_for_user(
    pool: &PgPool,
    user_id: i64,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Appointment>, AppError> {
    let sql = format!(
        "{SELECT_APPOINTMENT} WHERE $1 = ANY(participants) AND time > $2 ORDER BY time ASC, id ASC LIMIT $3"
    );
    let items = sqlx::query_as::<_, Appointment>(&sql)
        .bind(user_id)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(items)
}

pub async fn stats_for_user(pool: &PgPool, user_id: i64, now: DateTime<Utc>) -> Result<AppointmentStats, AppError> {
    let stats = sqlx::query_as::<_, AppointmentStats>(
        "SELECT \
             COUNT(*) FILTER (WHERE creator_id = $1) AS created, \
             COUNT(*) FILTER (WHERE $1 = ANY(participants)) AS participated, \
             COUNT(*) FILTER (WHERE $1 = ANY(participants) AND time > $2) AS upcoming \
         FROM appointments",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(stats)
}

/// Add a participant. Returns false if they were already on the roster.
pub async fn join(pool: &PgPool, id: i64, user_id: i64) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE appointments \
         SET participants = array_append(participants, $2), updated_at = now() \
         WHERE id = $1 AND NOT ($2 = ANY(participants))",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove a participant. Returns false if they were not on the roster.
pub async fn leave(pool: &PgPool, id: i64, user_id: i64) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE appointments \
         SET participants = array_remove(participants, $2), updated_at = now() \
         WHERE id = $1 AND $2 = ANY(participants)",
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Expand creator and participant ids into user references.
/// Users deleted since are dropped from the roster.
pub async fn expand(pool: &PgPool, appointments: Vec<Appointment>) -> Result<Vec<AppointmentView>, AppError> {
    let mut ids: Vec<i64> = appointments
        .iter()
        .flat_map(|a| std::iter::once(a.creator_id).chain(a.participants.iter().copied()))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let users: HashMap<i64, _> = user::find_refs(pool, &ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(appointments
        .into_iter()
        .map(|a| AppointmentView {
            id: a.id,
            game: a.game,
            time: a.time,
            description: a.description,
            creator: users.get(&a.creator_id).cloned(),
            participants: a.participants.iter().filter_map(|p| users.get(p).cloned()).collect(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        })
        .collect())
}
