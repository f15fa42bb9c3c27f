use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use std::fmt;

/// JSON body returned for every failed request.
#[derive(Serialize, Debug, Clone)]
pub struct ApiErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub enum AppError {
    Db(sqlx::Error),
    Hash(String),
    Session(String),
    Unauthorized(String),
    PermissionDenied(String),
    InvalidArgument(String),
    Conflict(String),
    RateLimited,
    NotFound,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Hash(e) => write!(f, "Hash error: {e}"),
            AppError::Session(e) => write!(f, "Session error: {e}"),
            AppError::Unauthorized(e) => write!(f, "Unauthorized: {e}"),
            AppError::PermissionDenied(e) => write!(f, "Permission denied: {e}"),
            AppError::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            AppError::Conflict(e) => write!(f, "Conflict: {e}"),
            AppError::RateLimited => write!(f, "Too many failed attempts"),
            AppError::NotFound => write!(f, "Not found"),
        }
    }
}

impl AppError {
    /// Validation helper: turns a list of field messages into one 400 error.
    pub fn validation(errors: Vec<String>) -> Self {
        AppError::InvalidArgument(errors.join("; "))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Db(_) | AppError::Hash(_) | AppError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::NotFound => ApiErrorResponse {
                error: "Not found".to_string(),
                details: None,
            },
            AppError::Unauthorized(msg) => ApiErrorResponse {
                error: "Unauthorized".to_string(),
                details: Some(msg.clone()),
            },
            AppError::PermissionDenied(msg) => ApiErrorResponse {
                error: "Forbidden".to_string(),
                details: Some(msg.clone()),
            },
            AppError::InvalidArgument(msg) => ApiErrorResponse {
                error: "Invalid request".to_string(),
                details: Some(msg.clone()),
            },
            AppError::Conflict(msg) => ApiErrorResponse {
                error: "Conflict".to_string(),
                details: Some(msg.clone()),
            },
            AppError::RateLimited => ApiErrorResponse {
                error: "Too many failed login attempts. Please try again later.".to_string(),
                details: None,
            },
            _ => {
                log::error!("{self}");
                ApiErrorResponse {
                    error: "Internal server error".to_string(),
                    details: None,
                }
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict(db_err.message().to_string());
            }
        }
        AppError::Db(e)
    }
}
