use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const WORKFLOW_TYPES: &[&str] = &["approval", "process", "notification"];
pub const DEFINITION_STATUSES: &[&str] = &["active", "inactive", "draft"];

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One stage of a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub approvers: Vec<i64>,
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
    #[serde(default = "default_deadline_hours")]
    pub deadline_hours: u32,
}

fn default_required_approvals() -> u32 {
    1
}

fn default_deadline_hours() -> u32 {
    24
}

/// A stored workflow template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub creator: i64,
    pub department: String,
    pub steps: Vec<StepDefinition>,
    pub status: String,
    pub applicable_documents: Vec<String>,
    pub auto_start: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Admins see everything; others see their own and their department's.
    pub fn is_visible_to(&self, user_id: i64, department: &str, is_admin: bool) -> bool {
        is_admin
            || self.creator == user_id
            || (!self.department.is_empty() && self.department == department)
    }
}

/// Create/replace payload for a workflow template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinitionInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_workflow_type")]
    pub workflow_type: String,
    pub department: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default = "default_definition_status")]
    pub status: String,
    #[serde(default)]
    pub applicable_documents: Vec<String>,
    #[serde(default)]
    pub auto_start: bool,
}

fn default_workflow_type() -> String {
    "approval".to_string()
}

fn default_definition_status() -> String {
    "draft".to_string()
}

impl WorkflowDefinitionInput {
    pub fn validate(&self) -> Vec<String> {
        use crate::auth::validate::{validate_one_of, validate_optional, validate_required};
        use crate::models::document::CATEGORIES;

        let mut errors = Vec::new();
        errors.extend(validate_required(&self.name, "Name", 100));
        errors.extend(validate_optional(&self.description, "Description", 1000));
        errors.extend(validate_one_of(&self.workflow_type, "Type", WORKFLOW_TYPES));
        errors.extend(validate_one_of(&self.status, "Status", DEFINITION_STATUSES));
        for category in &self.applicable_documents {
            errors.extend(validate_one_of(category, "Applicable document", CATEGORIES));
        }

        if self.steps.is_empty() {
            errors.push("A workflow needs at least one step".to_string());
        }
        for (i, step) in self.steps.iter().enumerate() {
            let label = format!("Step {}", i + 1);
            errors.extend(validate_required(&step.name, &format!("{label} name"), 100));
            if step.required_approvals < 1 {
                errors.push(format!("{label} needs at least one required approval"));
            }
            let mut distinct = step.approvers.clone();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() != step.approvers.len() {
                errors.push(format!("{label} lists an approver more than once"));
            }
            if (step.required_approvals as usize) > distinct.len() {
                errors.push(format!(
                    "{label} requires {} approvals but has {} approvers",
                    step.required_approvals,
                    distinct.len()
                ));
            }
        }
        errors
    }

    /// Every approver id referenced by any step, deduplicated.
    pub fn approver_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.steps.iter().flat_map(|s| s.approvers.iter().copied()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Draft,
    InProgress,
    Completed,
    Rejected,
    Canceled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Draft => "draft",
            InstanceStatus::InProgress => "in_progress",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Rejected => "rejected",
            InstanceStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InstanceStatus::Draft),
            "in_progress" => Some(InstanceStatus::InProgress),
            "completed" => Some(InstanceStatus::Completed),
            "rejected" => Some(InstanceStatus::Rejected),
            "canceled" => Some(InstanceStatus::Canceled),
            _ => None,
        }
    }

    /// Terminal states are sinks.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Rejected | InstanceStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceResult {
    Pending,
    Approved,
    Rejected,
    Canceled,
}

impl InstanceResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceResult::Pending => "pending",
            InstanceResult::Approved => "approved",
            InstanceResult::Rejected => "rejected",
            InstanceResult::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InstanceResult::Pending),
            "approved" => Some(InstanceResult::Approved),
            "rejected" => Some(InstanceResult::Rejected),
            "canceled" => Some(InstanceResult::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Pending,
    Approved,
    Rejected,
}

/// What an approver can do at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
    Approved,
    Rejected,
}

impl VoteAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(VoteAction::Approved),
            "rejected" => Some(VoteAction::Rejected),
            _ => None,
        }
    }
}

impl From<VoteAction> for VoteStatus {
    fn from(action: VoteAction) -> Self {
        match action {
            VoteAction::Approved => VoteStatus::Approved,
            VoteAction::Rejected => VoteStatus::Rejected,
        }
    }
}

/// One approver's decision at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproverVote {
    pub user: i64,
    pub status: VoteStatus,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub action_date: Option<DateTime<Utc>>,
}

/// The approvers of a step, in roster order, at most one entry per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproverVotes(Vec<ApproverVote>);

impl ApproverVotes {
    /// Pending entries for each distinct user, keeping first-seen order.
    pub fn from_users(users: &[i64]) -> Self {
        let mut votes = ApproverVotes::default();
        for &user in users {
            if !votes.contains(user) {
                votes.0.push(ApproverVote {
                    user,
                    status: VoteStatus::Pending,
                    comment: None,
                    action_date: None,
                });
            }
        }
        votes
    }

    pub fn contains(&self, user: i64) -> bool {
        self.0.iter().any(|v| v.user == user)
    }

    pub fn get(&self, user: i64) -> Option<&ApproverVote> {
        self.0.iter().find(|v| v.user == user)
    }

    /// Overwrite the user's entry, or append one if absent.
    pub fn upsert(&mut self, user: i64, status: VoteStatus, comment: Option<String>, at: DateTime<Utc>) {
        match self.0.iter_mut().find(|v| v.user == user) {
            Some(vote) => {
                vote.status = status;
                vote.comment = comment;
                vote.action_date = Some(at);
            }
            None => self.0.push(ApproverVote {
                user,
                status,
                comment,
                action_date: Some(at),
            }),
        }
    }

    pub fn approved_count(&self) -> usize {
        self.0.iter().filter(|v| v.status == VoteStatus::Approved).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApproverVote> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Runtime state of one step inside an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub step_id: String,
    pub name: String,
    pub required_approvals: u32,
    pub status: StepStatus,
    pub approvers: ApproverVotes,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceComment {
    pub user: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An instance that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewWorkflowInstance {
    pub workflow: i64,
    pub document: Option<i64>,
    pub initiator: i64,
    pub steps: Vec<StepState>,
    pub status: InstanceStatus,
    pub result: InstanceResult,
    pub created_at: DateTime<Utc>,
}

impl NewWorkflowInstance {
    pub fn into_instance(self, id: i64) -> WorkflowInstance {
        WorkflowInstance {
            id,
            workflow: self.workflow,
            document: self.document,
            initiator: self.initiator,
            current_step: 0,
            steps: self.steps,
            status: self.status,
            result: self.result,
            comments: Vec::new(),
            version: 0,
            created_at: self.created_at,
            updated_at: self.created_at,
            completed_at: None,
        }
    }
}

/// A running (or finished) execution of a definition against one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: i64,
    pub workflow: i64,
    pub document: Option<i64>,
    pub initiator: i64,
    pub current_step: usize,
    pub steps: Vec<StepState>,
    pub status: InstanceStatus,
    pub result: InstanceResult,
    pub comments: Vec<InstanceComment>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn is_approver(&self, user: i64) -> bool {
        self.steps.iter().any(|s| s.approvers.contains(user))
    }

    /// Admins, the initiator and any approver may read an instance.
    pub fn is_visible_to(&self, user: i64, is_admin: bool) -> bool {
        is_admin || self.initiator == user || self.is_approver(user)
    }
}
