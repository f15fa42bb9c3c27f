use actix_session::Session;
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};

use crate::auth::session::{ROLE_ADMIN, ROLE_MANAGER, require_role};
use crate::errors::AppError;
use crate::handlers::current_user;
use crate::models::document::{self, ApprovalStatus};
use crate::models::user::{self, User};
use crate::models::workflow::engine::{self, InstanceEvent, Outcome, Vote};
use crate::models::workflow::{self, VoteAction, WorkflowDefinition, WorkflowDefinitionInput, WorkflowInstance};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub document_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub action: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

fn require_definition_owner(me: &User, def: &WorkflowDefinition) -> Result<(), AppError> {
    if me.is_admin() || def.creator == me.id {
        Ok(())
    } else {
        Err(AppError::PermissionDenied("only the creator can modify this workflow".to_string()))
    }
}

/// Field validation plus a check that every approver is a real user.
async fn validate_definition(pool: &PgPool, input: &WorkflowDefinitionInput) -> Result<(), AppError> {
    let errors = input.validate();
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }
    let approvers = input.approver_ids();
    let known = user::count_existing(pool, &approvers).await?;
    if known != approvers.len() as i64 {
        return Err(AppError::InvalidArgument("One or more approvers do not exist".to_string()));
    }
    Ok(())
}

/// GET /api/workflows
pub async fn list_definitions(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let viewer = (!me.is_admin()).then_some((me.id, me.department.as_str()));
    let definitions = workflow::find_definitions_visible(&pool, viewer).await?;
    Ok(HttpResponse::Ok().json(definitions))
}

/// GET /api/workflows/{id}
pub async fn read_definition(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let def = workflow::find_definition(&pool, path.into_inner())
        .await?
        .ok_or(AppError::NotFound)?;
    if !def.is_visible_to(me.id, &me.department, me.is_admin()) {
        return Err(AppError::PermissionDenied("no access to this workflow".to_string()));
    }
    Ok(HttpResponse::Ok().json(def))
}

/// POST /api/workflows (admin or manager)
pub async fn create_definition(
    pool: web::Data<PgPool>,
    session: Session,
    body: web::Json<WorkflowDefinitionInput>,
) -> Result<HttpResponse, AppError> {
    require_role(&session, &[ROLE_ADMIN, ROLE_MANAGER])?;
    let me = current_user(&pool, &session).await?;
    validate_definition(&pool, &body).await?;

    let id = workflow::create_definition(&pool, me.id, &me.department, &body).await?;
    let def = workflow::find_definition(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("workflow {} '{}' created by {} with {} steps", def.id, def.name, me.username, def.steps.len());

    Ok(HttpResponse::Created().json(def))
}

/// PUT /api/workflows/{id}
pub async fn update_definition(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<WorkflowDefinitionInput>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let id = path.into_inner();
    let existing = workflow::find_definition(&pool, id).await?.ok_or(AppError::NotFound)?;
    require_definition_owner(&me, &existing)?;
    validate_definition(&pool, &body).await?;

    if !workflow::update_definition(&pool, id, &body).await? {
        return Err(AppError::NotFound);
    }
    let def = workflow::find_definition(&pool, id).await?.ok_or(AppError::NotFound)?;
    log::info!("workflow {} updated by {}", def.id, me.username);

    Ok(HttpResponse::Ok().json(def))
}

/// DELETE /api/workflows/{id}
pub async fn delete_definition(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let id = path.into_inner();
    let existing = workflow::find_definition(&pool, id).await?.ok_or(AppError::NotFound)?;
    require_definition_owner(&me, &existing)?;

    workflow::delete_definition(&pool, id).await?;
    log::info!("workflow {id} deleted by {}", me.username);

    Ok(HttpResponse::Ok().json(json!({ "message": "Workflow deleted" })))
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Mirror a finished instance onto its target document.
async fn sync_document(
    conn: &mut PgConnection,
    instance: &WorkflowInstance,
    outcome: Outcome,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let Some(doc_id) = instance.document else {
        return Ok(());
    };
    let (status, approved_by, date) = match outcome {
        Outcome::Completed => (ApprovalStatus::Approved, engine::final_approver(instance), Some(now)),
        Outcome::Rejected => (ApprovalStatus::Rejected, None, Some(now)),
        Outcome::Canceled => (ApprovalStatus::None, None, None),
        Outcome::Recorded | Outcome::Advanced { .. } | Outcome::Commented => return Ok(()),
    };
    document::set_approval_status(conn, doc_id, status, approved_by, date).await
}

async fn load_instance(pool: &PgPool, id: i64) -> Result<WorkflowInstance, AppError> {
    workflow::find_instance(pool, id).await?.ok_or(AppError::NotFound)
}

/// Run one event against a loaded instance and persist the result.
///
/// The write is conditional on the version the instance was read at, so a
/// concurrent writer turns this call into a Conflict with nothing stored.
async fn commit_event(
    pool: &PgPool,
    mut instance: WorkflowInstance,
    event: InstanceEvent,
) -> Result<(WorkflowInstance, Outcome), AppError> {
    let now = Utc::now();
    let outcome = engine::apply(&mut instance, event, now)?;

    let mut tx = pool.begin().await?;
    workflow::save_instance(&mut tx, &mut instance).await?;
    sync_document(&mut tx, &instance, outcome, now).await?;
    tx.commit().await?;

    Ok((instance, outcome))
}

/// POST /api/workflows/{id}/start
pub async fn start_instance(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: Option<web::Json<StartRequest>>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let def = workflow::find_definition(&pool, path.into_inner())
        .await?
        .ok_or(AppError::NotFound)?;
    let document_id = body.and_then(|b| b.into_inner().document_id);

    if let Some(doc_id) = document_id {
        let doc = document::find_by_id(&pool, doc_id).await?.ok_or(AppError::NotFound)?;
        if !doc.is_visible_to(me.id, &me.department, me.is_admin()) {
            return Err(AppError::PermissionDenied("no access to this document".to_string()));
        }
    }

    let now = Utc::now();
    let new = engine::start(&def, document_id, me.id, now)?;

    let mut tx = pool.begin().await?;
    let instance = workflow::insert_instance(&mut tx, new).await?;
    if let Some(doc_id) = document_id {
        document::set_approval_status(&mut tx, doc_id, ApprovalStatus::Pending, None, None).await?;
    }
    tx.commit().await?;

    log::info!(
        "workflow instance {} started from workflow {} by {}",
        instance.id,
        def.id,
        me.username
    );
    Ok(HttpResponse::Created().json(instance))
}

/// POST /api/workflows/instance/{id}/step/{step_index}
pub async fn submit_vote(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<(i64, usize)>,
    body: web::Json<VoteRequest>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let (id, step) = path.into_inner();
    let instance = load_instance(&pool, id).await?;

    let body = body.into_inner();
    let action = VoteAction::parse(&body.action).ok_or_else(|| {
        AppError::InvalidArgument("action must be one of: approved, rejected".to_string())
    })?;
    let vote = Vote {
        user: me.id,
        action,
        comment: body.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
    };
    let (instance, outcome) = match commit_event(&pool, instance, InstanceEvent::Vote { step, vote }).await {
        Ok(done) => done,
        Err(e) => {
            log::warn!("vote by {} on instance {id} step {step} refused: {e}", me.username);
            return Err(e);
        }
    };

    log::info!("instance {id}: {} voted {:?} on step {step} -> {outcome:?}", me.username, action);
    Ok(HttpResponse::Ok().json(instance))
}

/// GET /api/workflows/instances
pub async fn list_instances(pool: web::Data<PgPool>, session: Session) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let viewer = (!me.is_admin()).then_some(me.id);
    let instances = workflow::find_instances_visible(&pool, viewer).await?;
    Ok(HttpResponse::Ok().json(instances))
}

/// GET /api/workflows/instance/{id}
pub async fn read_instance(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let instance = load_instance(&pool, path.into_inner()).await?;
    if !instance.is_visible_to(me.id, me.is_admin()) {
        return Err(AppError::PermissionDenied("no access to this workflow instance".to_string()));
    }
    Ok(HttpResponse::Ok().json(instance))
}

/// POST /api/workflows/instance/{id}/cancel (admin)
pub async fn cancel_instance(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    if !me.is_admin() {
        return Err(AppError::PermissionDenied(format!("requires role: {ROLE_ADMIN}")));
    }
    let id = path.into_inner();

    let instance = load_instance(&pool, id).await?;
    let (instance, _) = commit_event(&pool, instance, InstanceEvent::Cancel).await?;
    log::info!("instance {id} canceled by {}", me.username);

    Ok(HttpResponse::Ok().json(instance))
}

/// POST /api/workflows/instance/{id}/comments
pub async fn add_comment(
    pool: web::Data<PgPool>,
    session: Session,
    path: web::Path<i64>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse, AppError> {
    let me = current_user(&pool, &session).await?;
    let instance = load_instance(&pool, path.into_inner()).await?;
    let event = InstanceEvent::Comment {
        user: me.id,
        is_admin: me.is_admin(),
        content: body.into_inner().content,
    };
    let (instance, _) = commit_event(&pool, instance, event).await?;
    Ok(HttpResponse::Ok().json(instance))
}
