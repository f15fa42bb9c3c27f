use actix_session::Session;

use crate::errors::AppError;
use crate::models::user::User;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MANAGER: &str = "manager";

pub const PERM_USERS_VIEW: &str = "users.view";
pub const PERM_GAME_REQUESTS_VIEW_ALL: &str = "game_requests.view_all";

/// A set of role or permission codes as stored in the session (csv).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSet(pub Vec<String>);

impl CodeSet {
    pub fn has(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn from_csv(csv: &str) -> Self {
        let codes = csv
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        CodeSet(codes)
    }

    pub fn to_csv(&self) -> String {
        self.0.join(",")
    }
}

/// Store the authenticated user's identity, roles and permissions.
pub fn start_session(session: &Session, user: &User) -> Result<(), AppError> {
    session.renew();
    session
        .insert("user_id", user.id)
        .and_then(|_| session.insert("username", &user.username))
        .and_then(|_| session.insert("roles", CodeSet(user.roles.clone()).to_csv()))
        .and_then(|_| session.insert("permissions", CodeSet(user.permissions.clone()).to_csv()))
        .map_err(|e| AppError::Session(e.to_string()))
}

/// Bring the session's roles and permissions in line with the stored user.
/// Only writes when something changed, so the cookie is not reissued on
/// every request.
pub fn refresh_codes(session: &Session, user: &User) -> Result<(), AppError> {
    let roles = CodeSet(user.roles.clone());
    let permissions = CodeSet(user.permissions.clone());
    if get_roles(session) != roles {
        session
            .insert("roles", roles.to_csv())
            .map_err(|e| AppError::Session(e.to_string()))?;
    }
    if get_permissions(session) != permissions {
        session
            .insert("permissions", permissions.to_csv())
            .map_err(|e| AppError::Session(e.to_string()))?;
    }
    Ok(())
}

pub fn get_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>("user_id").unwrap_or(None)
}

/// The signed-in user's id, or 401.
pub fn require_user_id(session: &Session) -> Result<i64, AppError> {
    get_user_id(session).ok_or_else(|| AppError::Unauthorized("Not signed in".to_string()))
}

pub fn get_roles(session: &Session) -> CodeSet {
    match session.get::<String>("roles") {
        Ok(Some(csv)) => CodeSet::from_csv(&csv),
        _ => CodeSet::default(),
    }
}

pub fn get_permissions(session: &Session) -> CodeSet {
    match session.get::<String>("permissions") {
        Ok(Some(csv)) => CodeSet::from_csv(&csv),
        _ => CodeSet::default(),
    }
}

pub fn is_admin(session: &Session) -> bool {
    get_roles(session).has(ROLE_ADMIN)
}

/// Require at least one of `roles`.
pub fn require_role(session: &Session, roles: &[&str]) -> Result<(), AppError> {
    let held = get_roles(session);
    if roles.iter().any(|r| held.has(r)) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(format!("requires role: {}", roles.join(" or "))))
    }
}

/// Require a permission code. Admins hold every permission.
pub fn require_permission(session: &Session, code: &str) -> Result<(), AppError> {
    if is_admin(session) || get_permissions(session).has(code) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(code.to_string()))
    }
}
