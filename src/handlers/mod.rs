pub mod appointment_handlers;
pub mod auth_handlers;
pub mod document_handlers;
pub mod game_request_handlers;
pub mod health;
pub mod user_handlers;
pub mod workflow_handlers;

use actix_session::Session;
use actix_web::{middleware::from_fn, web};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::middleware::{require_auth, require_json_content_type};
use crate::auth::session::require_user_id;
use crate::errors::AppError;
use crate::models::page_window;
use crate::models::user::{self, User};

/// Envelope for paginated list endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

/// `?page=&perPage=` with the usual defaults. List handlers take it as a
/// second `web::Query` next to their own filter struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page", alias = "limit")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    10
}

impl PageQuery {
    pub fn normalized(&self) -> (i64, i64) {
        let (page, per_page, _) = page_window(self.page, self.per_page);
        (page, per_page)
    }
}

/// Load the signed-in user's record. A session whose user has since been
/// deleted, suspended or deactivated is treated as signed out.
pub async fn current_user(pool: &PgPool, session: &Session) -> Result<User, AppError> {
    let id = require_user_id(session)?;
    let me = user::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    if !me.is_active() {
        return Err(AppError::Unauthorized(format!("Account is {}", me.status)));
    }
    Ok(me)
}

/// Extractor configs that turn malformed bodies, paths and queries into 400 JSON.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .limit(256 * 1024)
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::InvalidArgument(err.to_string()).into()),
    );
}

/// Mount the whole JSON API under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    extractor_configs(cfg);
    cfg.service(
        web::scope("/api")
            .wrap(from_fn(require_json_content_type))
            .wrap(from_fn(require_auth))
            .route("/health", web::get().to(health::check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(auth_handlers::register))
                    .route("/login", web::post().to(auth_handlers::login))
                    .route("/me", web::get().to(auth_handlers::me))
                    .route("/update-password", web::put().to(auth_handlers::update_password))
                    .route("/logout", web::post().to(auth_handlers::logout)),
            )
            // Fixed segments before /{id}
            .service(
                web::scope("/users")
                    .route("", web::get().to(user_handlers::list))
                    .route("/selectable", web::get().to(user_handlers::selectable))
                    .route("/stats", web::get().to(user_handlers::stats))
                    .route("/{id}", web::get().to(user_handlers::read))
                    .route("/{id}", web::put().to(user_handlers::update))
                    .route("/{id}", web::delete().to(user_handlers::delete))
                    .route("/{id}/status", web::patch().to(user_handlers::update_status)),
            )
            .service(
                web::scope("/documents")
                    .route("", web::get().to(document_handlers::list))
                    .route("", web::post().to(document_handlers::create))
                    .route("/{id}", web::get().to(document_handlers::read))
                    .route("/{id}", web::put().to(document_handlers::update))
                    .route("/{id}", web::delete().to(document_handlers::delete)),
            )
            .service(
                web::scope("/workflows")
                    .route("", web::get().to(workflow_handlers::list_definitions))
                    .route("", web::post().to(workflow_handlers::create_definition))
                    .route("/instances", web::get().to(workflow_handlers::list_instances))
                    .route("/instance/{id}", web::get().to(workflow_handlers::read_instance))
                    .route(
                        "/instance/{id}/step/{step_index}",
                        web::post().to(workflow_handlers::submit_vote),
                    )
                    .route("/instance/{id}/cancel", web::post().to(workflow_handlers::cancel_instance))
                    .route("/instance/{id}/comments", web::post().to(workflow_handlers::add_comment))
                    .route("/{id}", web::get().to(workflow_handlers::read_definition))
                    .route("/{id}", web::put().to(workflow_handlers::update_definition))
                    .route("/{id}", web::delete().to(workflow_handlers::delete_definition))
                    .route("/{id}/start", web::post().to(workflow_handlers::start_instance)),
            )
            .service(
                web::scope("/appointments")
                    .route("", web::get().to(appointment_handlers::list))
                    .route("", web::post().to(appointment_handlers::create))
                    .route("/my", web::get().to(appointment_handlers::mine))
                    .route("/{id}", web::get().to(appointment_handlers::read))
                    .route("/{id}", web::delete().to(appointment_handlers::delete))
                    .route("/{id}/join", web::post().to(appointment_handlers::join))
                    .route("/{id}/leave", web::post().to(appointment_handlers::leave)),
            )
            .service(
                web::scope("/game-requests")
                    .route("", web::post().to(game_request_handlers::create))
                    .route("/sent", web::get().to(game_request_handlers::sent))
                    .route("/received", web::get().to(game_request_handlers::received))
                    .route("/all", web::get().to(game_request_handlers::all))
                    .route("/statistics", web::get().to(game_request_handlers::statistics))
                    .route("/{id}", web::get().to(game_request_handlers::read))
                    .route("/{id}/respond", web::put().to(game_request_handlers::respond))
                    .route("/{id}/cancel", web::put().to(game_request_handlers::cancel)),
            ),
    );
}
