use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde_json::json;
use sqlx::PgPool;

use crate::auth::session::{PERM_GAME_REQUESTS_VIEW_ALL, is_admin, require_permission, require_user_id};
use crate::auth::validate;
use crate::errors::AppError;
use crate::models::game_request::{self, GameRequestInput, GameResponseInput, RESPONSE_STATUSES};
use crate::models::user;

async fn load_view(pool: &PgPool, id: i64) -> Result<HttpResponse, AppError> {
    let found = game_request::find_by_id(pool, id).await?.ok_or(AppError::NotFound)?;
    let view = game_request::expand(pool, vec![found]).await?;
    Ok(HttpResponse::Ok().json(view.first()))
}

/// POST /api/game-requests
pub async fn create(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<GameRequestInput>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let errors = body.validate();
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let receivers = body.distinct_receivers();
    if user::count_existing(&pool, &receivers).await? != receivers.len() as i64 {
        return Err(AppError::NotFound);
    }

    let id = game_request::create(&pool, me, &body).await?;
    log::info!("game request {id} sent by user {me} to {} receivers", receivers.len());

    let found = game_request::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    let view = game_request::expand(&pool, vec![found]).await?;
    Ok(HttpResponse::Created().json(view.first()))
}

/// GET /api/game-requests/sent (admin: all)
pub async fn sent(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let scope = (!is_admin(&session)).then_some(me);
    let items = game_request::find_sent(&pool, scope).await?;
    Ok(HttpResponse::Ok().json(game_request::expand(&pool, items).await?))
}

/// GET /api/game-requests/received (admin: all)
pub async fn received(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let scope = (!is_admin(&session)).then_some(me);
    let items = game_request::find_received(&pool, scope).await?;
    Ok(HttpResponse::Ok().json(game_request::expand(&pool, items).await?))
}

/// GET /api/game-requests/all (admin, or `game_requests.view_all`)
pub async fn all(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    require_permission(&session, PERM_GAME_REQUESTS_VIEW_ALL)?;
    let items = game_request::find_all(&pool).await?;
    Ok(HttpResponse::Ok().json(game_request::expand(&pool, items).await?))
}

/// GET /api/game-requests/statistics
pub async fn statistics(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let scope = (!is_admin(&session)).then_some(me);
    Ok(HttpResponse::Ok().json(game_request::statistics(&pool, scope).await?))
}

/// GET /api/game-requests/{id}
pub async fn read(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    let found = game_request::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    if !found.is_visible_to(me, is_admin(&session)) {
        return Err(AppError::PermissionDenied("not a party to this request".to_string()));
    }
    load_view(&pool, id).await
}

/// PUT /api/game-requests/{id}/respond (receivers only)
pub async fn respond(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<GameResponseInput>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    if let Some(msg) = validate::validate_one_of(&body.status, "Status", RESPONSE_STATUSES) {
        return Err(AppError::InvalidArgument(msg));
    }

    let mut tx = pool.begin().await?;
    let mut request = game_request::find_for_update(&mut tx, id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !request.is_receiver(me) {
        return Err(AppError::PermissionDenied("only receivers can respond".to_string()));
    }
    if request.status == "cancelled" {
        return Err(AppError::InvalidArgument("This request has been cancelled".to_string()));
    }
    request.record_response(me, &body.status, body.proposed_time);
    game_request::save(&mut tx, &request).await?;
    tx.commit().await?;
    log::info!("user {me} responded '{}' to game request {id}", body.status);

    load_view(&pool, id).await
}

/// PUT /api/game-requests/{id}/cancel (sender only)
pub async fn cancel(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = require_user_id(&session)?;
    let id = path.into_inner();
    let found = game_request::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;

    if found.sender != me {
        return Err(AppError::PermissionDenied("only the sender can cancel".to_string()));
    }
    if found.status == "cancelled" || !game_request::cancel(&pool, id).await? {
        return Err(AppError::InvalidArgument("Request is already cancelled".to_string()));
    }
    log::info!("game request {id} cancelled by user {me}");

    let updated = game_request::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Game request cancelled", "gameRequest": updated })))
}
