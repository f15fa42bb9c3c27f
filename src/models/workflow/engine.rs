//! Approval state machine for workflow instances.
//!
//! Everything here is pure: functions take an instance, an event and the
//! current time, and either mutate the instance and report an outcome or
//! return a [`WorkflowError`] leaving the instance untouched. Loading,
//! locking and storing are the caller's business.
//!
//! ```text
//! draft -> in_progress -> completed
//!                      -> rejected
//!                      -> canceled
//! ```

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use super::types::*;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    EmptyDefinition,
    StepOutOfRange { index: usize, count: usize },
    NotAnApprover { user: i64, step: usize },
    NotAParticipant { user: i64 },
    Closed(InstanceStatus),
    StepNotActive { index: usize, current: usize },
    EmptyComment,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::EmptyDefinition => write!(f, "workflow has no steps"),
            WorkflowError::StepOutOfRange { index, count } => {
                write!(f, "step index {index} is out of range ({count} steps)")
            }
            WorkflowError::NotAnApprover { user, step } => {
                write!(f, "user {user} is not an approver of step {step}")
            }
            WorkflowError::NotAParticipant { user } => {
                write!(f, "user {user} is neither initiator nor approver")
            }
            WorkflowError::Closed(status) => {
                write!(f, "instance is {} and no longer accepts changes", status.as_str())
            }
            WorkflowError::StepNotActive { index, current } => {
                write!(f, "step {index} is not accepting votes (current step is {current})")
            }
            WorkflowError::EmptyComment => write!(f, "comment must not be empty"),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::EmptyDefinition
            | WorkflowError::StepOutOfRange { .. }
            | WorkflowError::EmptyComment => AppError::InvalidArgument(e.to_string()),
            WorkflowError::NotAnApprover { .. } | WorkflowError::NotAParticipant { .. } => {
                AppError::PermissionDenied(e.to_string())
            }
            WorkflowError::Closed(_) | WorkflowError::StepNotActive { .. } => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}

/// A vote cast by one approver.
#[derive(Debug, Clone)]
pub struct Vote {
    pub user: i64,
    pub action: VoteAction,
    pub comment: Option<String>,
}

/// Everything that can happen to a stored instance.
#[derive(Debug, Clone)]
pub enum InstanceEvent {
    Vote { step: usize, vote: Vote },
    Cancel,
    Comment { user: i64, is_admin: bool, content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Vote stored; the step still needs more approvals.
    Recorded,
    /// The step reached its quorum and `next_step` is now active.
    Advanced { next_step: usize },
    /// The last step reached its quorum.
    Completed,
    Rejected,
    Canceled,
    Commented,
}

/// Materialize an instance from a definition.
pub fn start(
    definition: &WorkflowDefinition,
    document: Option<i64>,
    initiator: i64,
    now: DateTime<Utc>,
) -> Result<NewWorkflowInstance, WorkflowError> {
    if definition.steps.is_empty() {
        return Err(WorkflowError::EmptyDefinition);
    }

    let steps = definition
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepState {
            step_id: format!("{}-{}", definition.id, i),
            name: step.name.clone(),
            required_approvals: step.required_approvals.max(1),
            status: if i == 0 { StepStatus::InProgress } else { StepStatus::Pending },
            approvers: ApproverVotes::from_users(&step.approvers),
            start_date: (i == 0).then_some(now),
            end_date: None,
            deadline: Some(now + Duration::hours(i64::from(step.deadline_hours))),
        })
        .collect();

    Ok(NewWorkflowInstance {
        workflow: definition.id,
        document,
        initiator,
        steps,
        status: InstanceStatus::InProgress,
        result: InstanceResult::Pending,
        created_at: now,
    })
}

/// Single entry point used by the HTTP layer.
pub fn apply(
    instance: &mut WorkflowInstance,
    event: InstanceEvent,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    match event {
        InstanceEvent::Vote { step, vote } => submit_vote(instance, step, vote, now),
        InstanceEvent::Cancel => cancel(instance, now).map(|_| Outcome::Canceled),
        InstanceEvent::Comment { user, is_admin, content } => {
            add_comment(instance, user, is_admin, content, now).map(|_| Outcome::Commented)
        }
    }
}

/// Record an approver's vote and advance or close the instance.
///
/// Checks run in a fixed order: step range, approver membership, then
/// whether the instance and step still accept votes.
pub fn submit_vote(
    instance: &mut WorkflowInstance,
    step_index: usize,
    vote: Vote,
    now: DateTime<Utc>,
) -> Result<Outcome, WorkflowError> {
    let count = instance.steps.len();
    let step = instance
        .steps
        .get(step_index)
        .ok_or(WorkflowError::StepOutOfRange { index: step_index, count })?;

    if !step.approvers.contains(vote.user) {
        return Err(WorkflowError::NotAnApprover { user: vote.user, step: step_index });
    }
    if instance.status.is_terminal() {
        return Err(WorkflowError::Closed(instance.status));
    }
    if step_index != instance.current_step {
        return Err(WorkflowError::StepNotActive { index: step_index, current: instance.current_step });
    }

    let step = &mut instance.steps[step_index];
    step.approvers.upsert(vote.user, vote.action.into(), vote.comment, now);
    if step.status == StepStatus::Pending {
        step.status = StepStatus::InProgress;
        step.start_date.get_or_insert(now);
    }
    instance.updated_at = now;

    if vote.action == VoteAction::Rejected {
        step.status = StepStatus::Rejected;
        step.end_date = Some(now);
        instance.status = InstanceStatus::Rejected;
        instance.result = InstanceResult::Rejected;
        instance.completed_at = Some(now);
        return Ok(Outcome::Rejected);
    }

    if step.approvers.approved_count() < step.required_approvals as usize {
        return Ok(Outcome::Recorded);
    }

    step.status = StepStatus::Approved;
    step.end_date = Some(now);
    instance.current_step += 1;

    match instance.steps.get_mut(instance.current_step) {
        Some(next) => {
            next.status = StepStatus::InProgress;
            next.start_date = Some(now);
            Ok(Outcome::Advanced { next_step: instance.current_step })
        }
        None => {
            instance.status = InstanceStatus::Completed;
            instance.result = InstanceResult::Approved;
            instance.completed_at = Some(now);
            Ok(Outcome::Completed)
        }
    }
}

/// Administrative cancel of a live instance.
pub fn cancel(instance: &mut WorkflowInstance, now: DateTime<Utc>) -> Result<(), WorkflowError> {
    if instance.status.is_terminal() {
        return Err(WorkflowError::Closed(instance.status));
    }
    instance.status = InstanceStatus::Canceled;
    instance.result = InstanceResult::Canceled;
    instance.completed_at = Some(now);
    instance.updated_at = now;
    Ok(())
}

/// Append a discussion comment. Participants and admins only.
pub fn add_comment(
    instance: &mut WorkflowInstance,
    user: i64,
    is_admin: bool,
    content: String,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if !instance.is_visible_to(user, is_admin) {
        return Err(WorkflowError::NotAParticipant { user });
    }
    if instance.status.is_terminal() {
        return Err(WorkflowError::Closed(instance.status));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(WorkflowError::EmptyComment);
    }
    instance.comments.push(InstanceComment {
        user,
        content: content.to_string(),
        created_at: now,
    });
    instance.updated_at = now;
    Ok(())
}

/// The user whose vote closed the final step, if the instance completed.
pub fn final_approver(instance: &WorkflowInstance) -> Option<i64> {
    if instance.status != InstanceStatus::Completed {
        return None;
    }
    instance
        .steps
        .last()?
        .approvers
        .iter()
        .filter(|v| v.status == VoteStatus::Approved)
        .max_by_key(|v| v.action_date)
        .map(|v| v.user)
}
