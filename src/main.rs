use std::net::SocketAddr;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use trunk_logistics::{
    config::Config,
    db,
    entities::user::{self, UserRole},
    error::AppResult,
    middleware::request_log::log_request,
    routes,
    services::{distance, notifications::Dispatcher},
    utils::password::hash_password,
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trunk_logistics=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    if let Err(e) = seed_admin(&db, &config).await {
        tracing::error!(error = %e, "Failed to seed admin account");
    }

    let distance = distance::from_config(&config);

    // Notification outbox delivery
    tokio::spawn(Dispatcher::from_config(db.clone(), &config).run());

    let state = AppState {
        db,
        config: config.clone(),
        distance,
    };

    let app = routes::create_router(state)
        .layer(axum::middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

/// Seed the admin account if a password is configured and it doesn't exist yet
async fn seed_admin(db: &DatabaseConnection, config: &Config) -> AppResult<()> {
    let Some(password) = config.admin_password.as_deref() else {
        tracing::info!("ADMIN_PASSWORD not set, skipping admin seed");
        return Ok(());
    };
    let email = config.admin_email.trim().to_lowercase();

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let admin = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        password_hash: Set(hash_password(password)?),
        first_name: Set("Platform".to_string()),
        last_name: Set("Admin".to_string()),
        phone: Set(None),
        role: Set(UserRole::Admin),
        created_at: Set(Utc::now().fixed_offset()),
    };

    admin.insert(db).await?;
    tracing::info!("Admin account created: {}", email);
    Ok(())
}
