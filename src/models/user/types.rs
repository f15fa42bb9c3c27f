use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ROLES: &[&str] = &["admin", "manager", "employee"];
pub const STATUSES: &[&str] = &["active", "inactive", "suspended"];

/// Fields a user may change on their own profile.
pub const SELF_EDITABLE_FIELDS: &[&str] = &["name", "email", "phone", "avatar"];

/// Internal user record, including the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
    pub department: String,
    pub avatar: String,
    pub position: String,
    pub phone: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub status: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }
}

/// Safe version for API responses: no password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub department: String,
    pub avatar: String,
    pub position: String,
    pub phone: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub status: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        UserProfile {
            id: u.id,
            username: u.username,
            name: u.name,
            email: u.email,
            department: u.department,
            avatar: u.avatar,
            position: u.position,
            phone: u.phone,
            roles: u.roles,
            permissions: u.permissions,
            status: u.status,
            last_login: u.last_login,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Minimal user reference for pickers and embedded listings.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
    pub name: String,
}

/// Pagination result for the admin user list.
pub struct UserPage {
    pub users: Vec<UserProfile>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
}

/// New user data for creation. `password` is already hashed.
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
    pub department: String,
    pub position: String,
    pub phone: String,
    pub roles: Vec<String>,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub avatar: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
}
