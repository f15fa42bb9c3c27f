use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserRef;

pub const STATUSES: &[&str] = &["pending", "accepted", "rejected", "cancelled"];
pub const RESPONSE_STATUSES: &[&str] = &["accepted", "rejected"];

/// One receiver's answer. At most one per receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResponse {
    pub user: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRequest {
    pub id: i64,
    pub sender: i64,
    pub receivers: Vec<i64>,
    pub game_name: String,
    pub message: String,
    pub status: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub responses: Vec<GameResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameRequest {
    pub fn is_receiver(&self, user_id: i64) -> bool {
        self.receivers.contains(&user_id)
    }

    pub fn is_visible_to(&self, user_id: i64, is_admin: bool) -> bool {
        is_admin || self.sender == user_id || self.is_receiver(user_id)
    }

    /// Upsert the receiver's response. A proposed time only sticks on an
    /// acceptance, and becomes the scheduled time while the request is pending.
    pub fn record_response(&mut self, user: i64, status: &str, proposed_time: Option<DateTime<Utc>>) {
        let proposed_time = proposed_time.filter(|_| status == "accepted");
        match self.responses.iter_mut().find(|r| r.user == user) {
            Some(existing) => {
                existing.status = status.to_string();
                existing.proposed_time = proposed_time;
            }
            None => self.responses.push(GameResponse {
                user,
                status: status.to_string(),
                proposed_time,
            }),
        }
        if let Some(time) = proposed_time {
            if self.status == "pending" {
                self.scheduled_time = Some(time);
            }
        }
    }
}

/// Request with users expanded for responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRequestView {
    #[serde(flatten)]
    pub request: GameRequest,
    pub sender_info: Option<UserRef>,
    pub receiver_info: Vec<UserRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRequestInput {
    #[serde(default)]
    pub receivers: Vec<i64>,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub message: String,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl GameRequestInput {
    pub fn validate(&self) -> Vec<String> {
        use crate::auth::validate::{validate_optional, validate_required};

        let mut errors = Vec::new();
        if self.receivers.is_empty() {
            errors.push("At least one receiver is required".to_string());
        }
        errors.extend(validate_required(&self.game_name, "Game name", 100));
        errors.extend(validate_optional(&self.message, "Message", 500));
        errors
    }

    /// Receivers without duplicates, first occurrence wins.
    pub fn distinct_receivers(&self) -> Vec<i64> {
        let mut out: Vec<i64> = Vec::with_capacity(self.receivers.len());
        for &id in &self.receivers {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResponseInput {
    pub status: String,
    pub proposed_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, sqlx::FromRow)]
pub struct StatusCounts {
    pub total: i64,
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GameRequestStatistics {
    pub sent: StatusCounts,
    pub received: StatusCounts,
}
