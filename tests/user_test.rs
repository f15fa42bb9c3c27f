/// Integration tests for the user store: creation, lookup, pagination,
/// partial updates and identity collisions.
use oa_desk::auth::password;
use oa_desk::db;
use oa_desk::errors::AppError;
use oa_desk::models::user::{self, NewUser, UserUpdate};

#[macro_use]
mod common;
use common::{TEST_PASS, create_employee, create_user};

#[tokio::test]
async fn test_create_and_find() {
    let db = test_db!();
    let pool = db.pool();

    let id = create_user(pool, "alice", &["manager"], "finance").await;
    let found = user::find_by_id(pool, id).await.expect("query").expect("exists");
    assert_eq!(found.username, "alice");
    assert_eq!(found.roles, vec!["manager"]);
    assert_eq!(found.status, "active");
    assert!(found.is_active());
    assert!(!found.is_admin());
    assert!(password::verify_password(TEST_PASS, &found.password).expect("verify"));

    let by_name = user::find_by_username(pool, "alice").await.expect("query").expect("exists");
    assert_eq!(by_name.id, id);
    assert!(user::find_by_username(pool, "nobody").await.expect("query").is_none());

    db.cleanup().await;
}

#[tokio::test]
async fn test_duplicate_username_is_conflict() {
    let db = test_db!();
    let pool = db.pool();
    create_employee(pool, "alice").await;

    let dup = NewUser {
        username: "alice".to_string(),
        password: "x".to_string(),
        name: String::new(),
        email: None,
        department: String::new(),
        position: String::new(),
        phone: String::new(),
        roles: vec!["employee".to_string()],
    };
    let err = user::create(pool, &dup).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    db.cleanup().await;
}

#[tokio::test]
async fn test_identity_taken_ignores_self() {
    let db = test_db!();
    let pool = db.pool();
    let alice = create_employee(pool, "alice").await;
    create_employee(pool, "bob").await;

    let taken = user::identity_taken(pool, Some("bob"), None, Some(alice)).await.expect("query");
    assert_eq!(taken, Some("Username is already registered"));
    let taken = user::identity_taken(pool, None, Some("BOB@example.com"), Some(alice)).await.expect("query");
    assert_eq!(taken, Some("Email is already registered"));
    let own = user::identity_taken(pool, Some("alice"), Some("alice@example.com"), Some(alice))
        .await
        .expect("query");
    assert_eq!(own, None);

    db.cleanup().await;
}

#[tokio::test]
async fn test_paginated_search() {
    let db = test_db!();
    let pool = db.pool();
    for i in 0..5 {
        create_employee(pool, &format!("page_user_{i}")).await;
    }
    create_employee(pool, "other").await;

    let page1 = user::find_paginated(pool, 1, 2, None).await.expect("page 1");
    assert_eq!(page1.total_count, 6);
    assert_eq!(page1.users.len(), 2);
    assert_eq!(page1.users[0].username, "other");

    let filtered = user::find_paginated(pool, 1, 10, Some("PAGE_user")).await.expect("search");
    assert_eq!(filtered.total_count, 5);

    // Underscore is literal, not a wildcard
    let literal = user::find_paginated(pool, 1, 10, Some("_")).await.expect("search");
    assert_eq!(literal.total_count, 5);

    let beyond = user::find_paginated(pool, 9, 10, None).await.expect("empty page");
    assert!(beyond.users.is_empty());

    // Offset saturates instead of overflowing
    let far = user::find_paginated(pool, i64::MAX, 100, None).await.expect("far page");
    assert!(far.users.is_empty());
    assert_eq!(far.total_count, 6);

    db.cleanup().await;
}

#[tokio::test]
async fn test_partial_update_and_status() {
    let db = test_db!();
    let pool = db.pool();
    let id = create_employee(pool, "alice").await;

    let changes = UserUpdate {
        name: Some("Alice A.".to_string()),
        email: Some(String::new()),
        ..Default::default()
    };
    assert!(user::update(pool, id, &changes).await.expect("update"));
    let found = user::find_by_id(pool, id).await.expect("q").expect("u");
    assert_eq!(found.name, "Alice A.");
    assert_eq!(found.email, None);
    assert_eq!(found.department, "ops");

    assert!(user::update_status(pool, id, "suspended").await.expect("status"));
    let found = user::find_by_id(pool, id).await.expect("q").expect("u");
    assert!(!found.is_active());

    assert!(user::update_status(pool, id, "bogus").await.is_err());
    assert!(!user::update(pool, 9999, &changes).await.expect("missing"));

    db.cleanup().await;
}

#[tokio::test]
async fn test_seed_admin_only_once() {
    let db = test_db!();
    let pool = db.pool();

    assert!(db::seed_admin(pool, "admin123").await.expect("seed"));
    assert!(!db::seed_admin(pool, "admin123").await.expect("seed again"));

    let admin = user::find_by_username(pool, "admin").await.expect("q").expect("admin");
    assert!(admin.is_admin());
    assert_eq!(user::count(pool).await.expect("count"), 1);

    db.cleanup().await;
}

#[tokio::test]
async fn test_delete_and_refs() {
    let db = test_db!();
    let pool = db.pool();
    let a = create_employee(pool, "alice").await;
    let b = create_employee(pool, "bob").await;

    assert_eq!(user::count_existing(pool, &[a, b, 424242]).await.expect("count"), 2);
    let refs = user::find_refs(pool, &[a, b]).await.expect("refs");
    assert_eq!(refs.len(), 2);

    assert!(user::delete(pool, b).await.expect("delete"));
    assert!(!user::delete(pool, b).await.expect("delete again"));
    assert_eq!(user::find_selectable(pool).await.expect("list").len(), 1);

    db.cleanup().await;
}
