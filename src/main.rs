use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::{App, HttpServer, cookie::Key, middleware, web};

use admitd::handlers::{
    Integrations, application_handlers, audit_handlers, auth_handlers, document_handlers,
    message_handlers, outbox_handlers, payment_handlers, user_handlers, workflow_admin_handlers,
};
use admitd::integrations::{DevAnalyzer, DevGateway, LogNotifier, LogSync};
use admitd::workflow::{outbox, scanner};
use admitd::{audit, auth, db};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database_path = env_or("DATABASE_PATH", "data/admitd.db");
    let bind_addr = env_or("BIND_ADDR", "127.0.0.1:8080");
    let scan_interval = env_u64("SCAN_INTERVAL_SECS", 15);
    let outbox_interval = env_u64("OUTBOX_INTERVAL_SECS", 10);

    if let Some(dir) = std::path::Path::new(&database_path).parent() {
        std::fs::create_dir_all(dir).expect("Failed to create data directory");
    }

    let pool = db::init_pool(&database_path);
    db::run_migrations(&pool);

    let admin_hash = auth::password::hash_password(&env_or("ADMIN_PASSWORD", "admin123"))
        .expect("Failed to hash default admin password");
    db::seed_defaults(&pool, &admin_hash);

    {
        let conn = pool.get().expect("Failed to get connection for audit cleanup");
        audit::cleanup_old_entries(&conn);
    }

    // Session encryption key — load from SESSION_KEY for persistent sessions across restarts
    let secret_key = match std::env::var("SESSION_KEY") {
        Ok(val) if val.len() >= 64 => {
            log::info!("Using SESSION_KEY from environment");
            Key::from(val.as_bytes())
        }
        Ok(val) => {
            log::warn!(
                "SESSION_KEY too short ({} bytes, need 64+) — generating random key",
                val.len()
            );
            Key::generate()
        }
        Err(_) => {
            log::warn!("No SESSION_KEY set — generating random key (sessions lost on restart)");
            Key::generate()
        }
    };

    let integrations = Integrations {
        notifier: Arc::new(LogNotifier),
        sync: Arc::new(LogSync),
        gateway: Arc::new(DevGateway),
        analyzer: Arc::new(DevAnalyzer),
    };

    scanner::spawn_scanner(pool.clone(), scan_interval);
    outbox::spawn_dispatcher(
        pool.clone(),
        integrations.notifier.clone(),
        integrations.sync.clone(),
        outbox_interval,
    );

    log::info!("Starting server at http://{}", bind_addr);

    HttpServer::new(move || {
        let session_mw =
            SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                .cookie_secure(false)
                .cookie_http_only(true)
                .build();

        App::new()
            .wrap(session_mw)
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(integrations.clone()))
            // Static files (SPA assets)
            .service(actix_files::Files::new("/static", "./static"))
            // Public routes
            .route("/api/auth/login", web::post().to(auth_handlers::login))
            // Protected API
            .service(
                web::scope("/api")
                    .wrap(actix_web::middleware::from_fn(auth::middleware::require_auth))
                    .route("/auth/logout", web::post().to(auth_handlers::logout))
                    .route("/auth/me", web::get().to(auth_handlers::me))
                    // Users and roles
                    .route("/users", web::get().to(user_handlers::list))
                    .route("/users", web::post().to(user_handlers::create))
                    .route("/users/{id}", web::put().to(user_handlers::update))
                    .route("/users/{id}", web::delete().to(user_handlers::delete))
                    .route("/roles", web::get().to(user_handlers::roles))
                    // Applications
                    .route("/applications", web::get().to(application_handlers::list))
                    .route("/applications", web::post().to(application_handlers::create))
                    .route("/applications/{id}", web::get().to(application_handlers::get))
                    .route(
                        "/applications/{id}/data",
                        web::put().to(application_handlers::update_data),
                    )
                    .route(
                        "/applications/{id}/submit",
                        web::post().to(application_handlers::submit),
                    )
                    .route(
                        "/applications/{id}/history",
                        web::get().to(application_handlers::history),
                    )
                    .route(
                        "/applications/{id}/completeness",
                        web::get().to(application_handlers::completeness),
                    )
                    .route(
                        "/applications/{id}/transitions",
                        web::get().to(application_handlers::transitions),
                    )
                    .route(
                        "/applications/{id}/transitions",
                        web::post().to(application_handlers::execute_transition),
                    )
                    // Documents
                    .route(
                        "/applications/{id}/documents",
                        web::get().to(document_handlers::list),
                    )
                    .route(
                        "/applications/{id}/documents",
                        web::post().to(document_handlers::upload),
                    )
                    .route("/documents/{id}/verify", web::post().to(document_handlers::verify))
                    // Messages
                    .route(
                        "/applications/{id}/messages",
                        web::get().to(message_handlers::list),
                    )
                    .route(
                        "/applications/{id}/messages",
                        web::post().to(message_handlers::post),
                    )
                    .route(
                        "/applications/{id}/messages/read",
                        web::post().to(message_handlers::mark_read),
                    )
                    // Payments
                    .route(
                        "/applications/{id}/payments",
                        web::get().to(payment_handlers::list),
                    )
                    .route(
                        "/applications/{id}/payments",
                        web::post().to(payment_handlers::process),
                    )
                    // Workflow administration
                    .route("/workflows", web::get().to(workflow_admin_handlers::list))
                    .route("/workflows", web::post().to(workflow_admin_handlers::create))
                    .route("/workflows/{id}", web::get().to(workflow_admin_handlers::get_graph))
                    .route(
                        "/workflows/{id}/stages",
                        web::post().to(workflow_admin_handlers::create_stage),
                    )
                    .route(
                        "/workflows/{id}/stages/{stage_id}",
                        web::put().to(workflow_admin_handlers::update_stage),
                    )
                    .route(
                        "/workflows/{id}/stages/{stage_id}",
                        web::delete().to(workflow_admin_handlers::delete_stage),
                    )
                    .route(
                        "/workflows/{id}/transitions",
                        web::post().to(workflow_admin_handlers::create_transition),
                    )
                    .route(
                        "/workflows/{id}/transitions/{transition_id}",
                        web::put().to(workflow_admin_handlers::update_transition),
                    )
                    .route(
                        "/workflows/{id}/transitions/{transition_id}",
                        web::delete().to(workflow_admin_handlers::delete_transition),
                    )
                    .route(
                        "/workflows/{id}/validate",
                        web::get().to(workflow_admin_handlers::validate),
                    )
                    .route(
                        "/workflows/{id}/activate",
                        web::post().to(workflow_admin_handlers::activate),
                    )
                    .route(
                        "/workflows/{id}/deactivate",
                        web::post().to(workflow_admin_handlers::deactivate),
                    )
                    // Operator queues
                    .route("/outbox/failed", web::get().to(outbox_handlers::list_failed))
                    .route("/outbox/{id}/retry", web::post().to(outbox_handlers::retry))
                    .route("/audit", web::get().to(audit_handlers::list)),
            )
            // Anything else is JSON 404
            .default_service(web::to(|| async {
                actix_web::HttpResponse::NotFound()
                    .json(serde_json::json!({ "error": "not_found", "detail": "No such route" }))
            }))
    })
    .bind(&bind_addr)?
    .run()
    .await
}
