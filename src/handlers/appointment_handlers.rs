use actix_session::Session;
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::auth::session::require_user_id;
use crate::errors::AppError;
use crate::handlers::{PageQuery, PaginatedResponse};
use crate::models::appointment::{self, AppointmentFilter, AppointmentInput, AppointmentView, Involvement};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentListQuery {
    pub game: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MineQuery {
    #[serde(default, rename = "type")]
    pub involvement: Involvement,
}

async fn load_view(pool: &PgPool, id: i64) -> Result<AppointmentView, AppError> {
    let found = appointment::find_by_id(pool, id).await?.ok_or(AppError::NotFound)?;
    appointment::expand(pool, vec![found])
        .await?
        .pop()
        .ok_or(AppError::NotFound)
}

/// POST /api/appointments
pub async fn create(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<AppointmentInput>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let errors = body.validate(Utc::now());
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let id = appointment::create(&pool, me, &body).await?;
    log::info!("appointment {id} for '{}' created by user {me}", body.game.trim());

    Ok(HttpResponse::Created().json(load_view(&pool, id).await?))
}

/// GET /api/appointments
pub async fn list(
    pool: web::Data<PgPool>,
    paging: web::Query<PageQuery>,
    query: web::Query<AppointmentListQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let (page, per_page) = paging.normalized();
    let filter = AppointmentFilter {
        game: query.game,
        upcoming: query.upcoming,
    };

    let (items, total) = appointment::find_paginated(&pool, &filter, Utc::now(), page, per_page).await?;
    let items = appointment::expand(&pool, items).await?;

    Ok(HttpResponse::Ok().json(PaginatedResponse { items, page, per_page, total }))
}

/// GET /api/appointments/my?type=all|created|joined
pub async fn mine(
    pool: web::Data<PgPool>,
    session: Session,
    query: web::Query<MineQuery>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let items = appointment::find_for_user(&pool, me, query.involvement).await?;
    Ok(HttpResponse::Ok().json(appointment::expand(&pool, items).await?))
}

/// GET /api/appointments/{id}
pub async fn read(pool: web::Data<PgPool>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(load_view(&pool, path.into_inner()).await?))
}

/// POST /api/appointments/{id}/join
pub async fn join(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    let found = appointment::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;

    if found.is_past(Utc::now()) {
        return Err(AppError::InvalidArgument("Cannot join an appointment that has already started".to_string()));
    }
    if found.has_participant(me) || !appointment::join(&pool, id, me).await? {
        return Err(AppError::InvalidArgument("You already joined this appointment".to_string()));
    }
    log::info!("user {me} joined appointment {id}");

    Ok(HttpResponse::Ok().json(load_view(&pool, id).await?))
}

/// POST /api/appointments/{id}/leave
pub async fn leave(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    let found = appointment::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;

    if !found.has_participant(me) || !appointment::leave(&pool, id, me).await? {
        return Err(AppError::InvalidArgument("You are not a participant of this appointment".to_string()));
    }
    log::info!("user {me} left appointment {id}");

    Ok(HttpResponse::Ok().json(load_view(&pool, id).await?))
}

/// DELETE /api/appointments/{id} (creator only)
pub async fn delete(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    let found = appointment::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;

    if found.creator_id != me {
        return Err(AppError::PermissionDenied("only the creator can delete this appointment".to_string()));
    }
    appointment::delete(&pool, id).await?;
    log::info!("appointment {id} deleted by user {me}");

    Ok(HttpResponse::Ok().json(json!({ "message": "Appointment deleted" })))
}
