/// Integration tests for workflow definitions and the instance lifecycle
/// against Postgres: start, voting, optimistic locking and visibility.
use chrono::Utc;

use oa_desk::errors::AppError;
use oa_desk::models::document::{self, DocumentInput};
use oa_desk::models::workflow::engine::{self, InstanceEvent, Outcome, Vote};
use oa_desk::models::workflow::{
    self, InstanceResult, InstanceStatus, StepDefinition, StepStatus, VoteAction, WorkflowDefinitionInput,
};

#[macro_use]
mod common;
use common::{create_employee, create_user};

fn step(name: &str, approvers: Vec<i64>, required: u32) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        description: String::new(),
        approvers,
        required_approvals: required,
        deadline_hours: 24,
    }
}

fn definition_input(steps: Vec<StepDefinition>) -> WorkflowDefinitionInput {
    WorkflowDefinitionInput {
        name: "Purchase approval".to_string(),
        description: "Two-stage sign-off".to_string(),
        workflow_type: "approval".to_string(),
        department: None,
        steps,
        status: "active".to_string(),
        applicable_documents: vec!["contract".to_string()],
        auto_start: false,
    }
}

fn approve(user: i64) -> InstanceEvent {
    InstanceEvent::Vote {
        step: 0,
        vote: Vote { user, action: VoteAction::Approved, comment: None },
    }
}

#[tokio::test]
async fn test_definition_crud_roundtrip() {
    let db = test_db!();
    let pool = db.pool();
    let manager = create_user(pool, "mgr", &["manager"], "finance").await;
    let a = create_employee(pool, "alice").await;

    let input = definition_input(vec![step("Review", vec![a], 1)]);
    assert!(input.validate().is_empty());
    let id = workflow::create_definition(pool, manager, "finance", &input).await.expect("create");

    let def = workflow::find_definition(pool, id).await.expect("query").expect("exists");
    assert_eq!(def.creator, manager);
    assert_eq!(def.department, "finance");
    assert_eq!(def.steps, input.steps);

    let mut changed = input.clone();
    changed.name = "Renamed".to_string();
    changed.steps.push(step("Sign", vec![manager], 1));
    assert!(workflow::update_definition(pool, id, &changed).await.expect("update"));
    let def = workflow::find_definition(pool, id).await.expect("query").expect("exists");
    assert_eq!(def.name, "Renamed");
    assert_eq!(def.steps.len(), 2);

    assert!(workflow::delete_definition(pool, id).await.expect("delete"));
    assert!(workflow::find_definition(pool, id).await.expect("query").is_none());
    assert!(!workflow::delete_definition(pool, id).await.expect("delete again"));

    db.cleanup().await;
}

#[tokio::test]
async fn test_definition_visibility_by_department() {
    let db = test_db!();
    let pool = db.pool();
    let manager = create_user(pool, "mgr", &["manager"], "finance").await;
    let a = create_employee(pool, "alice").await;
    let input = definition_input(vec![step("Review", vec![a], 1)]);
    workflow::create_definition(pool, manager, "finance", &input).await.expect("create");

    let all = workflow::find_definitions_visible(pool, None).await.expect("admin list");
    assert_eq!(all.len(), 1);
    let finance = workflow::find_definitions_visible(pool, Some((a, "finance"))).await.expect("list");
    assert_eq!(finance.len(), 1);
    let ops = workflow::find_definitions_visible(pool, Some((a, "ops"))).await.expect("list");
    assert!(ops.is_empty());

    db.cleanup().await;
}

#[tokio::test]
async fn test_start_vote_complete_persists() {
    let db = test_db!();
    let pool = db.pool();
    let initiator = create_employee(pool, "ivan").await;
    let a = create_employee(pool, "alice").await;
    let b = create_employee(pool, "bob").await;

    let def_id = workflow::create_definition(pool, initiator, "ops", &definition_input(vec![step("Review", vec![a, b], 2)]))
        .await
        .expect("create def");
    let def = workflow::find_definition(pool, def_id).await.expect("query").expect("def");

    let new = engine::start(&def, None, initiator, Utc::now()).expect("start");
    let mut conn = pool.acquire().await.expect("conn");
    let started = workflow::insert_instance(&mut conn, new).await.expect("insert");
    drop(conn);
    assert_eq!(started.version, 0);
    assert_eq!(started.status, InstanceStatus::InProgress);

    let mut inst = workflow::find_instance(pool, started.id).await.expect("query").expect("instance");
    assert_eq!(inst.steps, started.steps);
    assert_eq!(inst.initiator, initiator);
    assert_eq!(inst.workflow, def_id);

    let outcome = engine::apply(&mut inst, approve(a), Utc::now()).expect("vote a");
    assert_eq!(outcome, Outcome::Recorded);
    let mut conn = pool.acquire().await.expect("conn");
    workflow::save_instance(&mut conn, &mut inst).await.expect("save");
    assert_eq!(inst.version, 1);

    let outcome = engine::apply(&mut inst, approve(b), Utc::now()).expect("vote b");
    assert_eq!(outcome, Outcome::Completed);
    workflow::save_instance(&mut conn, &mut inst).await.expect("save");
    drop(conn);

    let stored = workflow::find_instance(pool, started.id).await.expect("query").expect("instance");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.current_step, 1);
    assert_eq!(stored.status, InstanceStatus::Completed);
    assert_eq!(stored.result, InstanceResult::Approved);
    assert_eq!(stored.steps[0].status, StepStatus::Approved);
    assert_eq!(stored.steps[0].approvers.approved_count(), 2);
    assert!(stored.completed_at.is_some());

    db.cleanup().await;
}

#[tokio::test]
async fn test_stale_version_is_conflict() {
    let db = test_db!();
    let pool = db.pool();
    let initiator = create_employee(pool, "ivan").await;
    let a = create_employee(pool, "alice").await;
    let b = create_employee(pool, "bob").await;

    let def_id = workflow::create_definition(pool, initiator, "ops", &definition_input(vec![step("Review", vec![a, b], 2)]))
        .await
        .expect("create def");
    let def = workflow::find_definition(pool, def_id).await.expect("query").expect("def");
    let mut conn = pool.acquire().await.expect("conn");
    let started = workflow::insert_instance(&mut conn, engine::start(&def, None, initiator, Utc::now()).expect("start"))
        .await
        .expect("insert");

    // Two readers load the same version
    let mut first = workflow::find_instance(pool, started.id).await.expect("q").expect("i");
    let mut second = first.clone();

    engine::apply(&mut first, approve(a), Utc::now()).expect("vote a");
    workflow::save_instance(&mut conn, &mut first).await.expect("first write wins");

    engine::apply(&mut second, approve(b), Utc::now()).expect("vote b");
    let err = workflow::save_instance(&mut conn, &mut second).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    drop(conn);

    // Nothing from the losing write was stored
    let stored = workflow::find_instance(pool, started.id).await.expect("q").expect("i");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.status, InstanceStatus::InProgress);
    assert_eq!(stored.steps[0].approvers.approved_count(), 1);
    assert!(stored.steps[0].approvers.get(b).is_some_and(|v| v.action_date.is_none()));

    db.cleanup().await;
}

#[tokio::test]
async fn test_instance_visibility_includes_approvers() {
    let db = test_db!();
    let pool = db.pool();
    let initiator = create_employee(pool, "ivan").await;
    let a = create_employee(pool, "alice").await;
    let c = create_employee(pool, "carol").await;
    let outsider = create_employee(pool, "oscar").await;

    let def_id = workflow::create_definition(
        pool,
        initiator,
        "ops",
        &definition_input(vec![step("Review", vec![a], 1), step("Sign", vec![c], 1)]),
    )
    .await
    .expect("create def");
    let def = workflow::find_definition(pool, def_id).await.expect("query").expect("def");
    let mut conn = pool.acquire().await.expect("conn");
    workflow::insert_instance(&mut conn, engine::start(&def, None, initiator, Utc::now()).expect("start"))
        .await
        .expect("insert");
    drop(conn);

    for user in [initiator, a, c] {
        let visible = workflow::find_instances_visible(pool, Some(user)).await.expect("list");
        assert_eq!(visible.len(), 1, "user {user} should see the instance");
    }
    assert!(workflow::find_instances_visible(pool, Some(outsider)).await.expect("list").is_empty());
    assert_eq!(workflow::find_instances_visible(pool, None).await.expect("list").len(), 1);

    db.cleanup().await;
}

#[tokio::test]
async fn test_document_approval_status_follows_instance() {
    let db = test_db!();
    let pool = db.pool();
    let initiator = create_employee(pool, "ivan").await;
    let a = create_employee(pool, "alice").await;

    let doc_input = DocumentInput {
        title: Some("Supplier contract".to_string()),
        category: Some("contract".to_string()),
        ..Default::default()
    };
    let doc_id = document::create(pool, initiator, "ops", &doc_input).await.expect("doc");

    let def_id = workflow::create_definition(pool, initiator, "ops", &definition_input(vec![step("Review", vec![a], 1)]))
        .await
        .expect("create def");
    let def = workflow::find_definition(pool, def_id).await.expect("query").expect("def");

    let mut tx = pool.begin().await.expect("begin");
    let mut inst = workflow::insert_instance(&mut tx, engine::start(&def, Some(doc_id), initiator, Utc::now()).expect("start"))
        .await
        .expect("insert");
    document::set_approval_status(&mut tx, doc_id, document::ApprovalStatus::Pending, None, None)
        .await
        .expect("pending");
    tx.commit().await.expect("commit");

    let doc = document::find_by_id(pool, doc_id).await.expect("q").expect("doc");
    assert_eq!(doc.approval_status, "pending");

    let now = Utc::now();
    assert_eq!(engine::apply(&mut inst, approve(a), now).expect("vote"), Outcome::Completed);
    let mut tx = pool.begin().await.expect("begin");
    workflow::save_instance(&mut tx, &mut inst).await.expect("save");
    document::set_approval_status(
        &mut tx,
        doc_id,
        document::ApprovalStatus::Approved,
        engine::final_approver(&inst),
        Some(now),
    )
    .await
    .expect("approved");
    tx.commit().await.expect("commit");

    let doc = document::find_by_id(pool, doc_id).await.expect("q").expect("doc");
    assert_eq!(doc.approval_status, "approved");
    assert_eq!(doc.approved_by, Some(a));
    assert!(doc.approval_date.is_some());

    db.cleanup().await;
}
