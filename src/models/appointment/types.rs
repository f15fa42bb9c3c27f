use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserRef;

pub const GAME_MAX_LEN: usize = 50;
pub const DESCRIPTION_MAX_LEN: usize = 500;

/// A scheduled game session with its roster.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub game: String,
    pub time: DateTime<Utc>,
    pub description: String,
    #[serde(rename = "creator")]
    pub creator_id: i64,
    pub participants: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.time <= now
    }
}

/// Appointment with creator and participants expanded for responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: i64,
    pub game: String,
    pub time: DateTime<Utc>,
    pub description: String,
    pub creator: Option<UserRef>,
    pub participants: Vec<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    #[serde(default)]
    pub game: String,
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

impl AppointmentInput {
    pub fn validate(&self, now: DateTime<Utc>) -> Vec<String> {
        use crate::auth::validate::{validate_optional, validate_required};

        let mut errors = Vec::new();
        errors.extend(validate_required(&self.game, "Game", GAME_MAX_LEN));
        errors.extend(validate_optional(&self.description, "Description", DESCRIPTION_MAX_LEN));
        match self.time {
            None => errors.push("Time is required".to_string()),
            Some(t) if t <= now => errors.push("Time must be in the future".to_string()),
            Some(_) => {}
        }
        errors
    }
}

/// List filters for `GET /appointments`.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub game: Option<String>,
    pub upcoming: bool,
}

/// Which side of the roster `GET /appointments/my` looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Involvement {
    #[default]
    All,
    Created,
    Joined,
}

#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct AppointmentStats {
    pub created: i64,
    pub participated: i64,
    pub upcoming: i64,
}
