use actix_session::SessionExt;
use actix_web::{
    Error, HttpResponse,
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::Method,
    middleware::Next,
    web,
};
use sqlx::PgPool;

use crate::auth::session;
use crate::errors::{ApiErrorResponse, AppError};
use crate::models::user;

/// Routes reachable without a session.
const PUBLIC_PATHS: &[&str] = &["/api/health", "/api/auth/login", "/api/auth/register"];

fn unauthorized(req: ServiceRequest, details: &str) -> ServiceResponse<BoxBody> {
    let response = HttpResponse::Unauthorized().json(ApiErrorResponse {
        error: "Unauthorized".to_string(),
        details: Some(details.to_string()),
    });
    req.into_response(response)
}

/// Rejects requests without an authenticated session with a 401 JSON body.
///
/// The account is re-read on every request: a deleted, suspended or
/// inactive user is signed out at once, and role or permission changes
/// reach the session without a fresh login.
pub async fn require_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if PUBLIC_PATHS.contains(&req.path()) {
        return next.call(req).await.map(|res| res.map_into_left_body());
    }

    let session = req.get_session();
    let Some(user_id) = session::get_user_id(&session) else {
        return Ok(unauthorized(req, "Sign in required").map_into_right_body());
    };

    let pool = req
        .app_data::<web::Data<PgPool>>()
        .cloned()
        .ok_or_else(|| AppError::Session("database pool is not configured".to_string()))?;

    match user::find_by_id(&pool, user_id).await? {
        Some(found) if found.is_active() => session::refresh_codes(&session, &found)?,
        Some(found) => {
            log::warn!("signed out user {} on request: account is {}", found.username, found.status);
            session.purge();
            return Ok(unauthorized(req, &format!("Account is {}", found.status)).map_into_right_body());
        }
        None => {
            session.purge();
            return Ok(unauthorized(req, "Account no longer exists").map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

/// CSRF protection for the JSON API.
///
/// Mutations must be sent as `application/json`. A cross-origin HTML form
/// cannot produce that content type with cookies attached, so this check
/// stands in for per-request tokens. GET requests are exempt.
pub async fn require_json_content_type(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method();
    let is_mutation = method == Method::POST
        || method == Method::PUT
        || method == Method::PATCH
        || method == Method::DELETE;

    if is_mutation {
        let content_type = req
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("application/json") {
            let response = HttpResponse::BadRequest().json(ApiErrorResponse {
                error: "Content-Type must be application/json for mutation requests".to_string(),
                details: None,
            });
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}
