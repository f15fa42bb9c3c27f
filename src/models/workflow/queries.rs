use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use super::types::*;
use crate::errors::AppError;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: i64,
    name: String,
    description: String,
    workflow_type: String,
    creator_id: i64,
    department: String,
    steps: Json<Vec<StepDefinition>>,
    status: String,
    applicable_documents: Vec<String>,
    auto_start: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DefinitionRow> for WorkflowDefinition {
    fn from(row: DefinitionRow) -> Self {
        WorkflowDefinition {
            id: row.id,
            name: row.name,
            description: row.description,
            workflow_type: row.workflow_type,
            creator: row.creator_id,
            department: row.department,
            steps: row.steps.0,
            status: row.status,
            applicable_documents: row.applicable_documents,
            auto_start: row.auto_start,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_DEFINITION: &str = "\
    SELECT id, name, description, workflow_type, creator_id, department, steps, status, \
           applicable_documents, auto_start, created_at, updated_at \
    FROM workflows";

/// Store a new definition. `department` falls back to the creator's.
pub async fn create_definition(
    pool: &PgPool,
    creator_id: i64,
    creator_department: &str,
    input: &WorkflowDefinitionInput,
) -> Result<i64, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO workflows \
             (name, description, workflow_type, creator_id, department, steps, status, \
              applicable_documents, auto_start) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id",
    )
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(&input.workflow_type)
    .bind(creator_id)
    .bind(input.department.as_deref().unwrap_or(creator_department))
    .bind(Json(&input.steps))
    .bind(&input.status)
    .bind(&input.applicable_documents)
    .bind(input.auto_start)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn find_definition(pool: &PgPool, id: i64) -> Result<Option<WorkflowDefinition>, AppError> {
    let sql = format!("{SELECT_DEFINITION} WHERE id = $1");
    let row = sqlx::query_as::<_, DefinitionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(WorkflowDefinition::from))
}

/// Definitions a viewer may see, newest first. `None` means an administrator.
pub async fn find_definitions_visible(
    pool: &PgPool,
    viewer: Option<(i64, &str)>,
) -> Result<Vec<WorkflowDefinition>, AppError> {
    let sql = format!(
        "{SELECT_DEFINITION} \
         WHERE $1::BIGINT IS NULL \
            OR creator_id = $1 \
            OR (department <> '' AND department = $2) \
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, DefinitionRow>(&sql)
        .bind(viewer.map(|(id, _)| id))
        .bind(viewer.map(|(_, dept)| dept).unwrap_or(""))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(WorkflowDefinition::from).collect())
}

/// Replace a definition. Running instances keep their own step snapshot.
pub async fn update_definition(
    pool: &PgPool,
    id: i64,
    input: &WorkflowDefinitionInput,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE workflows SET \
             name = $2, description = $3, workflow_type = $4, \
             department = COALESCE($5, department), steps = $6, status = $7, \
             applicable_documents = $8, auto_start = $9, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(&input.workflow_type)
    .bind(&input.department)
    .bind(Json(&input.steps))
    .bind(&input.status)
    .bind(&input.applicable_documents)
    .bind(input.auto_start)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_definition(pool: &PgPool, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: i64,
    workflow_id: i64,
    document_id: Option<i64>,
    initiator_id: i64,
    current_step: i32,
    steps: Json<Vec<StepState>>,
    status: String,
    result: String,
    comments: Json<Vec<InstanceComment>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = AppError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let status = InstanceStatus::parse(&row.status)
            .ok_or_else(|| AppError::Db(sqlx::Error::Decode(format!("bad instance status {}", row.status).into())))?;
        let result = InstanceResult::parse(&row.result)
            .ok_or_else(|| AppError::Db(sqlx::Error::Decode(format!("bad instance result {}", row.result).into())))?;
        Ok(WorkflowInstance {
            id: row.id,
            workflow: row.workflow_id,
            document: row.document_id,
            initiator: row.initiator_id,
            current_step: usize::try_from(row.current_step).unwrap_or_default(),
            steps: row.steps.0,
            status,
            result,
            comments: row.comments.0,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_INSTANCE: &str = "\
    SELECT id, workflow_id, document_id, initiator_id, current_step, steps, status, result, \
           comments, version, created_at, updated_at, completed_at \
    FROM workflow_instances";

fn step_index(index: usize) -> Result<i32, AppError> {
    i32::try_from(index).map_err(|_| AppError::InvalidArgument("step index too large".to_string()))
}

/// Persist a freshly started instance on the caller's connection.
pub async fn insert_instance(
    conn: &mut PgConnection,
    new: NewWorkflowInstance,
) -> Result<WorkflowInstance, AppError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO workflow_instances \
             (workflow_id, document_id, initiator_id, current_step, steps, status, result, \
              comments, version, created_at, updated_at) \
         VALUES ($1, $2, $3, 0, $4, $5, $6, '[]', 0, $7, $7) \
         RETURNING id",
    )
    .bind(new.workflow)
    .bind(new.document)
    .bind(new.initiator)
    .bind(Json(&new.steps))
    .bind(new.status.as_str())
    .bind(new.result.as_str())
    .bind(new.created_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(new.into_instance(id))
}

pub async fn find_instance(pool: &PgPool, id: i64) -> Result<Option<WorkflowInstance>, AppError> {
    let sql = format!("{SELECT_INSTANCE} WHERE id = $1");
    let row = sqlx::query_as::<_, InstanceRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(WorkflowInstance::try_from).transpose()
}

/// Instances a user initiated or approves at any step, newest first.
/// `None` means an administrator and returns everything.
pub async fn find_instances_visible(
    pool: &PgPool,
    viewer: Option<i64>,
) -> Result<Vec<WorkflowInstance>, AppError> {
    let sql = format!(
        "{SELECT_INSTANCE} \
         WHERE $1::BIGINT IS NULL \
            OR initiator_id = $1 \
            OR EXISTS ( \
                SELECT 1 \
                FROM jsonb_array_elements(steps) AS s, \
                     jsonb_array_elements(s->'approvers') AS a \
                WHERE (a->>'user')::BIGINT = $1) \
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query_as::<_, InstanceRow>(&sql)
        .bind(viewer)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(WorkflowInstance::try_from).collect()
}

/// Write back an instance mutated by the engine.
///
/// The row is only updated if its version still matches the one that was
/// read; otherwise another writer got there first and this is a Conflict.
/// On success `instance.version` is bumped to the stored value.
pub async fn save_instance(
    conn: &mut PgConnection,
    instance: &mut WorkflowInstance,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE workflow_instances SET \
             current_step = $3, steps = $4, status = $5, result = $6, comments = $7, \
             updated_at = $8, completed_at = $9, version = version + 1 \
         WHERE id = $1 AND version = $2",
    )
    .bind(instance.id)
    .bind(instance.version)
    .bind(step_index(instance.current_step)?)
    .bind(Json(&instance.steps))
    .bind(instance.status.as_str())
    .bind(instance.result.as_str())
    .bind(Json(&instance.comments))
    .bind(instance.updated_at)
    .bind(instance.completed_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(
            "workflow instance was modified concurrently, reload and retry".to_string(),
        ));
    }
    instance.version += 1;
    Ok(())
}
