use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entities::notification;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

const PAGE_LIMIT: u64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// The caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Vec<notification::Model>>> {
    let mut select = notification::Entity::find()
        .filter(notification::Column::UserId.eq(claims.sub));
    if query.unread_only {
        select = select.filter(notification::Column::IsRead.eq(false));
    }

    let items = select
        .order_by_desc(notification::Column::CreatedAt)
        .limit(PAGE_LIMIT)
        .all(&state.db)
        .await?;
    Ok(Json(items))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<notification::Model>> {
    let item = notification::Entity::find_by_id(id)
        .filter(notification::Column::UserId.eq(claims.sub))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

    let mut active: notification::ActiveModel = item.into();
    active.is_read = Set(true);
    Ok(Json(active.update(&state.db).await?))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Value>> {
    let result = notification::Entity::update_many()
        .col_expr(notification::Column::IsRead, Expr::value(true))
        .filter(notification::Column::UserId.eq(claims.sub))
        .filter(notification::Column::IsRead.eq(false))
        .exec(&state.db)
        .await?;

    Ok(Json(json!({ "updated": result.rows_affected })))
}
