use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shepherd_api::{config::Config, db, middleware::auth::JwtSecret, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let jwt_secret = JwtSecret(config.jwt_secret.clone());
    let state = AppState::new(pool, config.clone());

    // CORS: the admin UI origin plus localhost for development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        // Milestone catalog
        .route(
            "/milestones",
            get(routes::milestones::list_milestones).post(routes::milestones::create_milestone),
        )
        .route(
            "/milestones/{id}",
            put(routes::milestones::update_milestone)
                .delete(routes::milestones::delete_milestone),
        )
        .route("/milestones/{id}/active", patch(routes::milestones::set_milestone_active))
        // Converts
        .route(
            "/converts",
            get(routes::converts::list_converts).post(routes::converts::register_convert),
        )
        .route("/converts/{id}", put(routes::converts::update_convert))
        .route("/converts/bulk-delete", post(routes::converts::bulk_delete_converts))
        .route("/converts/import", post(routes::converts::import_converts))
        // Progress
        .route(
            "/progress/{convert_id}",
            get(routes::progress::get_progress).patch(routes::progress::upsert_progress),
        )
        .route("/progress/{convert_id}/toggle", post(routes::progress::toggle_progress))
        .route("/progress/{convert_id}/bulk", post(routes::progress::bulk_update_progress))
        // Attendance
        .route("/attendance", post(routes::attendance::record_attendance))
        .route("/attendance/bulk", post(routes::attendance::bulk_record_attendance))
        .route("/attendance/stats/weekly", get(routes::attendance::weekly_stats))
        .route(
            "/attendance/{id}",
            delete(routes::attendance::remove_attendance),
        )
        .route(
            "/attendance/convert/{convert_id}",
            get(routes::attendance::list_attendance),
        )
        // Groups
        .route("/groups", get(routes::groups::list_groups).post(routes::groups::create_group))
        .route(
            "/groups/{id}",
            put(routes::groups::update_group).delete(routes::groups::delete_group),
        )
        // User accounts
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        .route("/users/{id}", put(routes::users::update_user))
        // Reporting
        .route("/export", get(routes::export::export))
        .route("/audit-log", get(routes::audit_log::list_audit_log))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("shepherd API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
