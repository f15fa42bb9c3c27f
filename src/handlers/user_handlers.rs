use actix_session::Session;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sqlx::PgPool;

use crate::auth::session::{PERM_USERS_VIEW, ROLE_ADMIN, is_admin, require_permission, require_role, require_user_id};
use crate::auth::validate;
use crate::errors::AppError;
use crate::handlers::{PageQuery, PaginatedResponse};
use crate::models::appointment;
use crate::models::user::{self, ROLES, SELF_EDITABLE_FIELDS, STATUSES, UserProfile, UserUpdate};

const UPCOMING_PREVIEW: i64 = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Admins may act on anyone; everyone else only on themselves.
fn require_self_or_admin(session: &Session, target: i64) -> Result<i64, AppError> {
    let me = require_user_id(session)?;
    if me != target && !is_admin(session) {
        return Err(AppError::PermissionDenied("not your account".to_string()));
    }
    Ok(me)
}

/// Reject keys a non-admin may not touch, then decode the update.
fn parse_update(body: Map<String, Value>, admin: bool) -> Result<UserUpdate, AppError> {
    if !admin {
        let forbidden: Vec<&str> = body
            .keys()
            .map(String::as_str)
            .filter(|k| !SELF_EDITABLE_FIELDS.contains(k))
            .collect();
        if !forbidden.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "cannot change: {} (allowed: {})",
                forbidden.join(", "),
                SELF_EDITABLE_FIELDS.join(", ")
            )));
        }
    }
    serde_json::from_value(Value::Object(body)).map_err(|e| AppError::InvalidArgument(e.to_string()))
}

fn validate_update(changes: &UserUpdate) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(username) = &changes.username {
        errors.extend(validate::validate_username(username));
    }
    if let Some(email) = &changes.email {
        errors.extend(validate::validate_email(email));
    }
    if let Some(name) = &changes.name {
        errors.extend(validate::validate_optional(name, "Name", 100));
    }
    if let Some(phone) = &changes.phone {
        errors.extend(validate::validate_optional(phone, "Phone", 30));
    }
    if let Some(roles) = &changes.roles {
        if roles.is_empty() {
            errors.push("At least one role is required".to_string());
        }
        for role in roles {
            errors.extend(validate::validate_one_of(role, "Role", ROLES));
        }
    }
    errors
}

/// GET /api/users (admin, or `users.view`)
pub async fn list(
    pool: web::Data<PgPool>,
    session: Session,
    paging: web::Query<PageQuery>,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, PERM_USERS_VIEW)?;

    let (page, per_page) = paging.normalized();
    let page = user::find_paginated(&pool, page, per_page, query.search.as_deref()).await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        items: page.users,
        page: page.page,
        per_page: page.per_page,
        total: page.total_count,
    }))
}

/// GET /api/users/selectable
pub async fn selectable(pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let users = user::find_selectable(&pool).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// GET /api/users/stats
pub async fn stats(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let now = Utc::now();

    let stats = appointment::stats_for_user(&pool, me, now).await?;
    let upcoming = appointment::find_upcoming_for_user(&pool, me, now, UPCOMING_PREVIEW).await?;
    let upcoming = appointment::expand(&pool, upcoming).await?;

    Ok(HttpResponse::Ok().json(json!({
        "stats": stats,
        "upcomingAppointments": upcoming,
    })))
}

/// GET /api/users/{id}
pub async fn read(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    require_self_or_admin(&session, id)?;

    let found = user::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    let stats = appointment::stats_for_user(&pool, id, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "user": UserProfile::from(found),
        "stats": stats,
    })))
}

/// PUT /api/users/{id}
pub async fn update(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<Map<String, Value>>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    require_self_or_admin(&session, id)?;

    let changes = parse_update(body.into_inner(), is_admin(&session))?;
    let errors = validate_update(&changes);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    if let Some(msg) =
        user::identity_taken(&pool, changes.username.as_deref(), changes.email.as_deref(), Some(id)).await?
    {
        return Err(AppError::Conflict(msg.to_string()));
    }

    if !user::update(&pool, id, &changes).await? {
        return Err(AppError::NotFound);
    }
    let updated = user::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("user {} updated", updated.username);

    Ok(HttpResponse::Ok().json(json!({ "user": UserProfile::from(updated) })))
}

/// PATCH /api/users/{id}/status (admin)
pub async fn update_status(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<StatusRequest>,
) -> Result<HttpResponse, AppError> {
    require_role(&session, &[ROLE_ADMIN])?;
    let id = path.into_inner();

    if let Some(msg) = validate::validate_one_of(&body.status, "Status", STATUSES) {
        return Err(AppError::InvalidArgument(msg));
    }
    if !user::update_status(&pool, id, &body.status).await? {
        return Err(AppError::NotFound);
    }
    let updated = user::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("user {} status set to {}", updated.username, updated.status);

    Ok(HttpResponse::Ok().json(json!({ "user": UserProfile::from(updated) })))
}

/// DELETE /api/users/{id} (admin)
pub async fn delete(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_role(&session, &[ROLE_ADMIN])?;
    let id = path.into_inner();

    if require_user_id(&session)? == id {
        return Err(AppError::InvalidArgument("You cannot delete your own account".to_string()));
    }
    if !user::delete(&pool, id).await? {
        return Err(AppError::NotFound);
    }
    log::info!("user {id} deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted" })))
}
