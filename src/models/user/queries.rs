use sqlx::PgPool;

use super::types::{NewUser, User, UserPage, UserProfile, UserRef, UserUpdate};
use crate::errors::AppError;
use crate::models::page_window;

const SELECT_USER: &str = "\
    SELECT id, username, password, name, email, department, avatar, position, phone, \
           roles, permissions, status, last_login, created_at, updated_at \
    FROM users";

/// Insert a new user. Returns the new id; a taken username or email is a Conflict.
pub async fn create(pool: &PgPool, new: &NewUser) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (username, password, name, email, department, position, phone, roles) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(&new.username)
    .bind(&new.password)
    .bind(&new.name)
    .bind(&new.email)
    .bind(&new.department)
    .bind(&new.position)
    .bind(&new.phone)
    .bind(&new.roles)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<User>, AppError> {
    let sql = format!("{SELECT_USER} WHERE id = $1");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Find user by username for authentication.
pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, AppError> {
    let sql = format!("{SELECT_USER} WHERE username = $1");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// True if `username` or `email` is held by a user other than `except_id`.
pub async fn identity_taken(
    pool: &PgPool,
    username: Option<&str>,
    email: Option<&str>,
    except_id: Option<i64>,
) -> Result<Option<&'static str>, AppError> {
    if let Some(name) = username {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE username = $1 AND id <> COALESCE($2, -1)",
        )
        .bind(name)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if n > 0 {
            return Ok(Some("Username is already registered"));
        }
    }
    if let Some(mail) = email.filter(|m| !m.is_empty()) {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE lower(email) = lower($1) AND id <> COALESCE($2, -1)",
        )
        .bind(mail)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if n > 0 {
            return Ok(Some("Email is already registered"));
        }
    }
    Ok(None)
}

pub async fn count(pool: &PgPool) -> Result<i64, AppError> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Count how many of `ids` exist.
pub async fn count_existing(pool: &PgPool, ids: &[i64]) -> Result<i64, AppError> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Newest-first page of users, optionally filtered by a case-insensitive
/// substring of username or email.
pub async fn find_paginated(
    pool: &PgPool,
    page: i64,
    per_page: i64,
    search: Option<&str>,
) -> Result<UserPage, AppError> {
    let (page, per_page, offset) = page_window(page, per_page);
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let filter = "($1::TEXT IS NULL OR username ILIKE $1 OR COALESCE(email, '') ILIKE $1)";

    let (total_count,): (i64,) =
        sqlx::query_as(&format!("SELECT COUNT(*) FROM users WHERE {filter}"))
            .bind(&pattern)
            .fetch_one(pool)
            .await?;

    let sql = format!("{SELECT_USER} WHERE {filter} ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3");
    let users = sqlx::query_as::<_, User>(&sql)
        .bind(&pattern)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();

    Ok(UserPage { users, page, per_page, total_count })
}

/// All users as picker entries, ordered by username.
pub async fn find_selectable(pool: &PgPool) -> Result<Vec<UserRef>, AppError> {
    let items = sqlx::query_as::<_, UserRef>(
        "SELECT id, username, name FROM users ORDER BY username",
    )
    .fetch_all(pool)
    .await?;
    Ok(items)
}

/// Picker entries for the given ids, in no particular order. Unknown ids are skipped.
pub async fn find_refs(pool: &PgPool, ids: &[i64]) -> Result<Vec<UserRef>, AppError> {
    let items = sqlx::query_as::<_, UserRef>("SELECT id, username, name FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(items)
}

/// Apply a partial update. Returns false if the user does not exist.
pub async fn update(pool: &PgPool, id: i64, changes: &UserUpdate) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE users SET \
             username    = COALESCE($2, username), \
             name        = COALESCE($3, name), \
             email       = CASE WHEN $4::TEXT IS NULL THEN email \
                                WHEN $4 = '' THEN NULL ELSE lower($4) END, \
             department  = COALESCE($5, department), \
             avatar      = COALESCE($6, avatar), \
             position    = COALESCE($7, position), \
             phone       = COALESCE($8, phone), \
             roles       = COALESCE($9, roles), \
             permissions = COALESCE($10, permissions), \
             updated_at  = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&changes.username)
    .bind(&changes.name)
    .bind(&changes.email)
    .bind(&changes.department)
    .bind(&changes.avatar)
    .bind(&changes.position)
    .bind(&changes.phone)
    .bind(&changes.roles)
    .bind(&changes.permissions)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_status(pool: &PgPool, id: i64, status: &str) -> Result<bool, AppError> {
    let result = sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace the password hash.
pub async fn update_password(pool: &PgPool, id: i64, hash: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET password = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &PgPool, id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
