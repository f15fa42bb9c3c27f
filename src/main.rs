use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::{App, HttpServer, cookie::Key, middleware, web};
use std::path::Path;

use oa_desk::auth::rate_limit::RateLimiter;
use oa_desk::config::Config;
use oa_desk::{db, handlers};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;
    db::seed_admin(&pool, &config.admin_password)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to seed admin user: {e}")))?;

    // Session signing key: load from SESSION_KEY for sessions that survive restarts
    let secret_key = match config.session_key.as_deref() {
        Some(val) if val.len() >= 64 => {
            log::info!("Using SESSION_KEY from environment");
            Key::from(val.as_bytes())
        }
        Some(val) => {
            log::warn!("SESSION_KEY too short ({} bytes, need 64+), generating random key", val.len());
            Key::generate()
        }
        None => {
            log::warn!("No SESSION_KEY set, generating random key (sessions lost on restart)");
            Key::generate()
        }
    };

    let limiter = web::Data::new(RateLimiter::new());
    let static_dir = config.static_dir.clone();
    if !Path::new(&static_dir).is_dir() {
        log::warn!("Static directory {static_dir} not found, static requests will 404");
    }

    log::info!("Starting server at http://{}", config.bind_addr);

    let cookie_secure = config.cookie_secure;
    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
            .cookie_secure(cookie_secure)
            .cookie_http_only(true)
            .build();

        let app = App::new()
            .wrap(session_mw)
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(pool.clone()))
            .app_data(limiter.clone())
            .configure(handlers::configure);

        // The SPA bundle is mounted last so /api wins
        app.service(
            actix_files::Files::new("/", &static_dir)
                .index_file("index.html")
                .prefer_utf8(true),
        )
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
