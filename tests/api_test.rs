/// HTTP-level tests: middleware ordering, error bodies and the approval flow
/// driven through the JSON API.
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;

use oa_desk::auth::rate_limit::RateLimiter;
use oa_desk::handlers;
use oa_desk::models::user::{self, UserUpdate};
use oa_desk::models::workflow::{self, StepDefinition, WorkflowDefinitionInput, engine};

#[macro_use]
mod common;
use common::{TEST_PASS, create_employee, create_user};

/// Build the app around a pool, the way `main` does minus static files.
macro_rules! app {
    ($pool:expr) => {
        test::init_service(
            App::new()
                .wrap(
                    SessionMiddleware::builder(CookieSessionStore::default(), Key::from(&[7u8; 64][..]))
                        .cookie_secure(false)
                        .build(),
                )
                .app_data(web::Data::new($pool))
                .app_data(web::Data::new(RateLimiter::new()))
                .configure(handlers::configure),
        )
        .await
    };
}

/// Sign in through the API and return the session cookie.
macro_rules! login {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": $username, "password": TEST_PASS }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "login as {}", $username);
        resp.response()
            .cookies()
            .find(|c| c.name() == "id")
            .expect("session cookie")
            .into_owned()
    }};
}

fn single_step_definition(approvers: Vec<i64>) -> WorkflowDefinitionInput {
    WorkflowDefinitionInput {
        name: "Expense sign-off".to_string(),
        description: String::new(),
        workflow_type: "approval".to_string(),
        department: None,
        steps: vec![StepDefinition {
            name: "Review".to_string(),
            description: String::new(),
            approvers,
            required_approvals: 1,
            deadline_hours: 24,
        }],
        status: "active".to_string(),
        applicable_documents: Vec::new(),
        auto_start: false,
    }
}

/// A pool that never connects. Requests that reach the database fail,
/// so a passing test proves the handler answered first.
fn offline_pool() -> sqlx::PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy("postgres://nobody@127.0.0.1:1/none")
        .expect("lazy pool")
}

#[actix_web::test]
async fn test_health_is_public() {
    let app = app!(offline_pool());
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "OA server is running");
}

#[actix_web::test]
async fn test_protected_route_requires_session() {
    let app = app!(offline_pool());
    for uri in ["/api/documents", "/api/workflows/instances", "/api/auth/me"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Unauthorized");
    }
}

#[actix_web::test]
async fn test_mutation_requires_json_content_type() {
    let app = app!(offline_pool());
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .set_payload("username=a&password=b")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let app = app!(offline_pool());
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_register_validation_precedes_database() {
    let app = app!(offline_pool());
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "username": "a", "password": "x" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["details"].is_string());
}

#[actix_web::test]
async fn test_wrong_password_is_unauthorized() {
    let db = test_db!();
    create_employee(db.pool(), "alice").await;
    let app = app!(db.pool().clone());

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "alice", "password": "wrong-pass" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let cookie = login!(app, "alice");
    let req = test::TestRequest::get().uri("/api/auth/me").cookie(cookie).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"].get("password").is_none());

    db.cleanup().await;
}

#[actix_web::test]
async fn test_approval_flow_over_http() {
    let db = test_db!();
    let pool = db.pool();
    create_user(pool, "mgr", &["manager"], "ops").await;
    let alice = create_employee(pool, "alice").await;
    let bob = create_employee(pool, "bob").await;
    create_employee(pool, "carol").await;
    let app = app!(pool.clone());

    // Employees cannot define workflows
    let carol = login!(app, "carol");
    let definition = json!({
        "name": "Expense sign-off",
        "type": "approval",
        "status": "active",
        "steps": [{ "name": "Review", "approvers": [alice, bob], "requiredApprovals": 1 }]
    });
    let req = test::TestRequest::post()
        .uri("/api/workflows")
        .cookie(carol.clone())
        .set_json(&definition)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let mgr = login!(app, "mgr");
    let req = test::TestRequest::post()
        .uri("/api/workflows")
        .cookie(mgr.clone())
        .set_json(&definition)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let def: Value = test::read_body_json(resp).await;
    let def_id = def["id"].as_i64().expect("definition id");

    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/{def_id}/start"))
        .cookie(mgr.clone())
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let inst: Value = test::read_body_json(resp).await;
    let inst_id = inst["id"].as_i64().expect("instance id");
    assert_eq!(inst["status"], "in_progress");
    assert_eq!(inst["steps"][0]["status"], "in_progress");

    // Non-approver is refused, and cannot even read the instance
    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{inst_id}/step/0"))
        .cookie(carol.clone())
        .set_json(json!({ "action": "approved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    let req = test::TestRequest::get()
        .uri(&format!("/api/workflows/instance/{inst_id}"))
        .cookie(carol)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let alice_cookie = login!(app, "alice");
    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{inst_id}/step/0"))
        .cookie(alice_cookie.clone())
        .set_json(json!({ "action": "maybe" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{inst_id}/step/0"))
        .cookie(alice_cookie.clone())
        .set_json(json!({ "action": "approved", "comment": "fine" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let done: Value = test::read_body_json(resp).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"], "approved");
    assert_eq!(done["version"], 1);

    // The instance is closed now
    let bob_cookie = login!(app, "bob");
    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{inst_id}/step/0"))
        .cookie(bob_cookie)
        .set_json(json!({ "action": "rejected" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{inst_id}/step/7"))
        .cookie(alice_cookie)
        .set_json(json!({ "action": "approved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    db.cleanup().await;
}

#[actix_web::test]
async fn test_suspended_user_is_signed_out() {
    let db = test_db!();
    let pool = db.pool();
    let alice = create_employee(pool, "alice").await;
    let def_id = workflow::create_definition(pool, alice, "ops", &single_step_definition(vec![alice]))
        .await
        .expect("create def");
    let def = workflow::find_definition(pool, def_id).await.expect("q").expect("def");
    let mut conn = pool.acquire().await.expect("conn");
    let inst = workflow::insert_instance(&mut conn, engine::start(&def, None, alice, Utc::now()).expect("start"))
        .await
        .expect("insert");
    drop(conn);
    let app = app!(pool.clone());

    let cookie = login!(app, "alice");
    user::update_status(pool, alice, "suspended").await.expect("suspend");

    let req = test::TestRequest::get().uri("/api/auth/me").cookie(cookie.clone()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The same cookie cannot vote either, and nothing is recorded
    let req = test::TestRequest::post()
        .uri(&format!("/api/workflows/instance/{}/step/0", inst.id))
        .cookie(cookie)
        .set_json(json!({ "action": "approved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    let stored = workflow::find_instance(pool, inst.id).await.expect("q").expect("inst");
    assert_eq!(stored.version, 0);
    assert_eq!(stored.steps[0].approvers.approved_count(), 0);

    // Reactivated accounts must sign in again
    user::update_status(pool, alice, "active").await.expect("reactivate");
    login!(app, "alice");

    db.cleanup().await;
}

#[actix_web::test]
async fn test_role_change_applies_to_live_session() {
    let db = test_db!();
    let pool = db.pool();
    let carol = create_employee(pool, "carol").await;
    let app = app!(pool.clone());
    let cookie = login!(app, "carol");

    let create = |cookie: Cookie<'static>| {
        test::TestRequest::post()
            .uri("/api/workflows")
            .cookie(cookie)
            .set_json(json!({
                "name": "Leave request",
                "steps": [{ "name": "Review", "approvers": [carol] }]
            }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, create(cookie.clone())).await.status(), StatusCode::FORBIDDEN);

    let promote = UserUpdate {
        roles: Some(vec!["manager".to_string()]),
        ..Default::default()
    };
    assert!(user::update(pool, carol, &promote).await.expect("promote"));
    assert_eq!(test::call_service(&app, create(cookie)).await.status(), StatusCode::CREATED);

    db.cleanup().await;
}

#[actix_web::test]
async fn test_missing_workflow_and_instance_are_not_found() {
    let db = test_db!();
    let pool = db.pool();
    create_employee(pool, "alice").await;
    let app = app!(pool.clone());
    let cookie = login!(app, "alice");

    let req = test::TestRequest::post()
        .uri("/api/workflows/424242/start")
        .cookie(cookie.clone())
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::post()
        .uri("/api/workflows/instance/424242/step/0")
        .cookie(cookie.clone())
        .set_json(json!({ "action": "approved" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // Existence is checked before the action is parsed
    let req = test::TestRequest::post()
        .uri("/api/workflows/instance/424242/step/0")
        .cookie(cookie)
        .set_json(json!({ "action": "maybe" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Not found");

    db.cleanup().await;
}

#[actix_web::test]
async fn test_user_list_tolerates_huge_page() {
    let db = test_db!();
    let pool = db.pool();
    create_user(pool, "boss", &["admin"], "ops").await;
    let app = app!(pool.clone());
    let cookie = login!(app, "boss");

    let req = test::TestRequest::get()
        .uri("/api/users?page=9223372036854775807&perPage=100")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(body["total"], 1);
    assert_eq!(body["perPage"], 100);

    db.cleanup().await;
}
