use axum::{
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::handlers::{admin, auth, bookings, notifications, profile, trucks};
use crate::middleware::auth::{auth_middleware, require_admin, require_customer, require_provider};
use crate::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Public equipment catalogue
    let catalogue_routes = Router::new()
        .route("/", get(trucks::list_trucks))
        .route("/{id}", get(trucks::get_truck));

    let profile_routes = Router::new()
        .route("/", get(profile::get_profile))
        .route("/", put(profile::upsert_profile))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Provider fleet management
    let provider_routes = Router::new()
        .route("/trucks", get(trucks::my_trucks))
        .route("/trucks", post(trucks::create_truck))
        .route("/trucks/{id}", put(trucks::update_truck))
        .route("/trucks/{id}", delete(trucks::delete_truck))
        .layer(middleware::from_fn(require_provider))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_all_users))
        .route("/trucks/{id}", delete(admin::delete_truck))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Any authenticated party; role scoping happens in the lifecycle manager
    let booking_routes = Router::new()
        .route(
            "/",
            post(bookings::create_booking).route_layer(middleware::from_fn(require_customer)),
        )
        .route("/", get(bookings::list_bookings))
        .route("/price-estimate", get(bookings::price_estimate))
        .route("/rental-price-estimate", get(bookings::rental_price_estimate))
        .route(
            "/stats",
            get(bookings::booking_stats).route_layer(middleware::from_fn(require_admin)),
        )
        .route("/{id}", get(bookings::get_booking))
        .route("/{id}", put(bookings::update_booking))
        .route("/{id}", delete(bookings::delete_booking))
        .route("/{id}/status", put(bookings::update_booking_status))
        .route("/{id}/history", get(bookings::booking_history))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let notification_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/read-all", put(notifications::mark_all_read))
        .route("/{id}/read", put(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth_routes)
        .nest("/api/trucks", catalogue_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/provider", provider_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/bookings", booking_routes)
        .nest("/api/notifications", notification_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use rust_decimal::Decimal;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::entities::user::UserRole;
    use crate::services::distance::StaticDistanceTable;
    use crate::utils::jwt::{encode_token, Claims};

    const SECRET: &str = "test-secret";

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/test".to_string(),
            jwt_secret: SECRET.to_string(),
            jwt_expiration_hours: 1,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            google_maps_api_key: None,
            distance_timeout_secs: 5,
            default_transport_price: Decimal::from(200),
            notification_poll_secs: 5,
            notification_batch_size: 50,
            notification_max_attempts: 5,
            notification_webhook_url: None,
            admin_email: "admin@test.local".to_string(),
            admin_password: None,
        };

        AppState {
            db: MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            config,
            distance: Arc::new(StaticDistanceTable),
        }
    }

    fn bearer(role: UserRole) -> String {
        let claims = Claims::new(Uuid::new_v4(), "user@test.local", role, chrono::Duration::hours(1));
        let token = encode_token(&claims, SECRET).unwrap();
        format!("Bearer {}", token)
    }

    async fn send(request: Request<Body>) -> StatusCode {
        create_router(test_state())
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        assert_eq!(send(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let request = Request::get("/api/bookings")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_require_admin() {
        let request = Request::get("/api/bookings/stats")
            .header(header::AUTHORIZATION, bearer(UserRole::Customer))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_only_customers_create_bookings() {
        let request = Request::post("/api/bookings")
            .header(header::AUTHORIZATION, bearer(UserRole::Provider))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        assert_eq!(send(request).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_fleet_routes_require_provider() {
        let request = Request::get("/api/provider/trucks")
            .header(header::AUTHORIZATION, bearer(UserRole::Customer))
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(request).await, StatusCode::FORBIDDEN);
    }
}
