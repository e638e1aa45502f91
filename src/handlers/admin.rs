use axum::{
    extract::{Path, State},
    Extension, Json,
};
use sea_orm::{EntityTrait, QueryOrder};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entities::user;
use crate::error::AppResult;
use crate::services::fleet;
use crate::utils::jwt::Claims;
use crate::AppState;

/// List all users (admin)
pub async fn list_all_users(State(state): State<AppState>) -> AppResult<Json<Vec<user::Model>>> {
    let users = user::Entity::find()
        .order_by_desc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(users))
}

/// Delete any truck (admin). Open bookings keep a snapshot of it.
pub async fn delete_truck(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let detached = fleet::delete_truck(&state.db, id, true).await?;
    tracing::info!(truck_id = %id, admin_id = %claims.sub, "Truck removed by admin");

    Ok(Json(json!({
        "message": "Truck deleted successfully",
        "bookings_preserved": detached,
    })))
}
