use actix_session::Session;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::net::{IpAddr, Ipv4Addr};

use crate::auth::session::{self, ROLE_ADMIN};
use crate::auth::{password, rate_limit::RateLimiter, validate};
use crate::errors::AppError;
use crate::handlers::current_user;
use crate::models::user::{self, NewUser, ROLES, UserProfile};

const DEFAULT_ROLE: &str = "employee";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub phone: String,
    pub roles: Option<Vec<String>>,
}

impl RegisterRequest {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(validate::validate_username(&self.username));
        errors.extend(validate::validate_password(&self.password));
        errors.extend(validate::validate_email(&self.email));
        errors.extend(validate::validate_optional(&self.name, "Name", 100));
        errors.extend(validate::validate_optional(&self.department, "Department", 100));
        errors.extend(validate::validate_optional(&self.position, "Position", 100));
        errors.extend(validate::validate_optional(&self.phone, "Phone", 30));
        for role in self.roles.iter().flatten() {
            errors.extend(validate::validate_one_of(role, "Role", ROLES));
        }
        errors
    }

    /// Requested roles, defaulting to employee.
    fn roles(&self) -> Vec<String> {
        match &self.roles {
            Some(roles) if !roles.is_empty() => {
                let mut roles = roles.clone();
                roles.sort();
                roles.dedup();
                roles
            }
            _ => vec![DEFAULT_ROLE.to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn client_ip(req: &HttpRequest) -> IpAddr {
    req.peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// POST /api/auth/register
///
/// Anyone may self-register as an employee. Other roles need an admin
/// session, in which case the admin stays signed in as themselves.
pub async fn register(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let errors = body.validate();
    if !errors.is_empty() {
        log::warn!("registration rejected for '{}': {}", body.username, errors.join("; "));
        return Err(AppError::validation(errors));
    }

    let roles = body.roles();
    let acting_admin = session::is_admin(&session);
    if roles.iter().any(|r| r != DEFAULT_ROLE) && !acting_admin {
        return Err(AppError::PermissionDenied(
            "only an administrator can assign roles".to_string(),
        ));
    }

    let username = body.username.trim();
    let email = body.email.trim().to_lowercase();
    if let Some(msg) = user::identity_taken(&pool, Some(username), Some(&email), None).await? {
        return Err(AppError::Conflict(msg.to_string()));
    }

    let new_user = NewUser {
        username: username.to_string(),
        password: password::hash_password(&body.password)?,
        name: body.name.trim().to_string(),
        email: (!email.is_empty()).then_some(email),
        department: body.department.trim().to_string(),
        position: body.position.trim().to_string(),
        phone: body.phone.trim().to_string(),
        roles,
    };
    let id = user::create(&pool, &new_user).await?;
    let created = user::find_by_id(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("user {} registered (id {})", created.username, created.id);

    if session::get_user_id(&session).is_none() {
        session::start_session(&session, &created)?;
    }

    Ok(HttpResponse::Created().json(json!({ "user": UserProfile::from(created) })))
}

/// POST /api/auth/login
pub async fn login(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    session: Session,
    limiter: web::Data<RateLimiter>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    // Rate-limit check before any database access
    let ip = client_ip(&req);
    if limiter.is_blocked(ip) {
        log::warn!("login blocked for {ip}: too many failures");
        return Err(AppError::RateLimited);
    }

    let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

    let Some(found) = user::find_by_username(&pool, body.username.trim()).await? else {
        limiter.record_failure(ip);
        return Err(invalid());
    };
    if !password::verify_password(&body.password, &found.password)? {
        limiter.record_failure(ip);
        log::warn!("failed login for '{}' from {ip}", found.username);
        return Err(invalid());
    }
    if !found.is_active() {
        return Err(AppError::Unauthorized(format!("Account is {}", found.status)));
    }

    limiter.clear(ip);
    user::touch_last_login(&pool, found.id).await?;
    session::start_session(&session, &found)?;
    log::info!("user {} signed in", found.username);

    let refreshed = user::find_by_id(&pool, found.id).await?.unwrap_or(found);
    Ok(HttpResponse::Ok().json(json!({ "user": UserProfile::from(refreshed) })))
}

/// GET /api/auth/me
pub async fn me(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": UserProfile::from(me) })))
}

/// PUT /api/auth/update-password
pub async fn update_password(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;

    if let Some(msg) = validate::validate_password(&body.new_password) {
        return Err(AppError::InvalidArgument(msg));
    }
    if !password::verify_password(&body.current_password, &me.password)? {
        return Err(AppError::InvalidArgument("Current password is incorrect".to_string()));
    }

    let hash = password::hash_password(&body.new_password)?;
    user::update_password(&pool, me.id, &hash).await?;
    log::info!("user {} changed their password", me.username);

    Ok(HttpResponse::Ok().json(json!({ "message": "Password updated" })))
}

/// POST /api/auth/logout
pub async fn logout(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::NoContent().finish()
}
