//! Shared test infrastructure for model layer tests.
//!
//! Each test gets its own Postgres schema on the server named by
//! `TEST_DATABASE_URL`, with all migrations applied. When the variable is
//! unset the database tests are skipped.
#![allow(dead_code)]

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use oa_desk::auth::password;
use oa_desk::db::MIGRATOR;
use oa_desk::models::user::{self, NewUser};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const TEST_PASS: &str = "secret123";

static SCHEMA_SEQ: AtomicU32 = AtomicU32::new(0);

/// Skip the current test when no database is configured.
macro_rules! test_db {
    () => {
        match common::setup_test_db().await {
            Some(db) => db,
            None => {
                eprintln!("TEST_DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

// ============================================================================
// DATABASE SETUP
// ============================================================================

pub struct TestDb {
    pool: PgPool,
    admin: PgPool,
    schema: String,
}

impl TestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drop the schema. Tests that panic leave theirs behind.
    pub async fn cleanup(self) {
        self.pool.close().await;
        let _ = self
            .admin
            .execute(format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema).as_str())
            .await;
    }
}

/// Create an isolated schema, point a pool at it and run migrations.
pub async fn setup_test_db() -> Option<TestDb> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let schema = format!(
        "t_{}_{}_{}",
        std::process::id(),
        SCHEMA_SEQ.fetch_add(1, Ordering::SeqCst),
        nanos
    );

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    admin
        .execute(format!("CREATE SCHEMA {schema}").as_str())
        .await
        .expect("create schema");

    let options: PgConnectOptions = url.parse().expect("parse TEST_DATABASE_URL");
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(options.options([("search_path", schema.as_str())]))
        .await
        .expect("connect test pool");

    MIGRATOR.run(&pool).await.expect("run migrations");

    Some(TestDb { pool, admin, schema })
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Insert a user with the given roles and department. Returns the id.
pub async fn create_user(pool: &PgPool, username: &str, roles: &[&str], department: &str) -> i64 {
    let new = NewUser {
        username: username.to_string(),
        password: password::hash_password(TEST_PASS).expect("hash"),
        name: username.to_uppercase(),
        email: Some(format!("{username}@example.com")),
        department: department.to_string(),
        position: String::new(),
        phone: String::new(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    };
    user::create(pool, &new).await.expect("create user")
}

pub async fn create_employee(pool: &PgPool, username: &str) -> i64 {
    create_user(pool, username, &["employee"], "ops").await
}
