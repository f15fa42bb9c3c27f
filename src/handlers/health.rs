use actix_web::HttpResponse;
use chrono::Utc;
use serde_json::json;

/// GET /api/health
pub async fn check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "code": 200,
        "message": "OA server is running",
        "timestamp": Utc::now(),
    }))
}
