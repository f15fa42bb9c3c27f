use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::handlers::current_user;
use crate::models::document::{self, DocumentFilter};

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

/// GET /api/documents
/// Documents the caller may see, with optional title search and category filter.
pub async fn list(
    pool: web::Data<PgPool>,
    session: Session,
    query: web::Query<DocumentListQuery>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let query = query.into_inner();
    let filter = DocumentFilter {
        search: query.q,
        category: query.category.filter(|c| !c.is_empty()),
    };

    let viewer = (!me.is_admin()).then_some((me.id, me.department.as_str()));
    let documents = document::find_visible(&pool, viewer, &filter).await?;

    Ok(HttpResponse::Ok().json(documents))
}
