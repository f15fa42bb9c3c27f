use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::auth::password;
use crate::models::user::{self, NewUser};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await?;
    log::info!("Database migrations complete");
    Ok(())
}

/// Create the initial admin account when the user table is empty.
/// Returns true if an account was created.
pub async fn seed_admin(pool: &PgPool, admin_password: &str) -> Result<bool, String> {
    let existing = user::count(pool).await.map_err(|e| e.to_string())?;
    if existing > 0 {
        log::info!("Database already seeded ({existing} users), skipping admin seed");
        return Ok(false);
    }

    let hash = password::hash_password(admin_password).map_err(|e| e.to_string())?;
    let admin = NewUser {
        username: "admin".to_string(),
        password: hash,
        name: "Administrator".to_string(),
        email: None,
        department: String::new(),
        position: String::new(),
        phone: String::new(),
        roles: vec!["admin".to_string()],
    };
    user::create(pool, &admin).await.map_err(|e| e.to_string())?;
    log::info!("Seeded default admin user");
    Ok(true)
}
