use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde_json::json;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::handlers::current_user;
use crate::models::document::{self, Document, DocumentInput};
use crate::models::user::User;

/// Only the creator or an admin may change or remove a document.
fn require_owner(me: &User, doc: &Document) -> Result<(), AppError> {
    if me.is_admin() || doc.creator_id == me.id {
        Ok(())
    } else {
        Err(AppError::PermissionDenied("only the creator can modify this document".to_string()))
    }
}

/// GET /api/documents/{id}
pub async fn read(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let doc = document::find_by_id(&pool, path.into_inner())
        .await?
        .ok_or(AppError::NotFound)?;

    if !doc.is_visible_to(me.id, &me.department, me.is_admin()) {
        return Err(AppError::PermissionDenied("no access to this document".to_string()));
    }
    Ok(HttpResponse::Ok().json(doc))
}

/// POST /api/documents
/// The caller becomes the creator and the document lands in their department.
pub async fn create(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<DocumentInput>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;

    let errors = body.validate(true);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let id = document::create(&pool, me.id, &me.department, &body).await?;
    let doc = document::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("document {} '{}' created by {}", doc.id, doc.title, me.username);

    Ok(HttpResponse::Created().json(doc))
}

/// PUT /api/documents/{id}
pub async fn update(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<DocumentInput>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let id = path.into_inner();
    let existing = document::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    require_owner(&me, &existing)?;

    let errors = body.validate(false);
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    if !document::update(&pool, id, &body).await? {
        return Err(AppError::NotFound);
    }
    let doc = document::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("document {} updated by {} (version {})", doc.id, me.username, doc.version);

    Ok(HttpResponse::Ok().json(doc))
}

/// DELETE /api/documents/{id}
pub async fn delete(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let id = path.into_inner();
    let existing = document::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    require_owner(&me, &existing)?;

    document::delete(&pool, id).await?;
    log::info!("document {id} deleted by {}", me.username);

    Ok(HttpResponse::Ok().json(json!({ "message": "Document deleted" })))
}
