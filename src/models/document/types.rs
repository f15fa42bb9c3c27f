use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CATEGORIES: &[&str] = &["notice", "report", "contract", "form", "other"];
pub const STATUSES: &[&str] = &["draft", "published", "archived"];
pub const ACCESS_LEVELS: &[&str] = &["public", "department", "private"];

/// Approval state mirrored from the workflow running against the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::None => "none",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub category: String,
    pub tags: Vec<String>,
    #[serde(rename = "creator")]
    pub creator_id: i64,
    pub creator_name: String,
    pub department: String,
    pub status: String,
    pub access_level: String,
    pub shared_with: Vec<i64>,
    pub approval_status: String,
    pub approved_by: Option<i64>,
    pub approval_date: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Visibility rule shared by the list query and single-document reads.
    pub fn is_visible_to(&self, user_id: i64, department: &str, is_admin: bool) -> bool {
        is_admin
            || self.creator_id == user_id
            || self.access_level == "public"
            || self.shared_with.contains(&user_id)
            || (self.access_level == "department"
                && !self.department.is_empty()
                && self.department == department)
    }
}

/// Create/update payload. On update every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    pub access_level: Option<String>,
    pub shared_with: Option<Vec<i64>>,
}

impl DocumentInput {
    /// Field validation. `creating` makes the title mandatory.
    pub fn validate(&self, creating: bool) -> Vec<String> {
        use crate::auth::validate::{validate_one_of, validate_required};

        let mut errors = Vec::new();
        match &self.title {
            Some(title) => errors.extend(validate_required(title, "Title", 200)),
            None if creating => errors.push("Title is required".to_string()),
            None => {}
        }
        if let Some(category) = &self.category {
            errors.extend(validate_one_of(category, "Category", CATEGORIES));
        }
        if let Some(status) = &self.status {
            errors.extend(validate_one_of(status, "Status", STATUSES));
        }
        if let Some(level) = &self.access_level {
            errors.extend(validate_one_of(level, "Access level", ACCESS_LEVELS));
        }
        if self.file_size.is_some_and(|s| s < 0) {
            errors.push("File size cannot be negative".to_string());
        }
        errors
    }
}

/// Optional list filters.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub search: Option<String>,
    pub category: Option<String>,
}
