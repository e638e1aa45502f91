use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::booking_status_history;
use crate::error::AppResult;
use crate::services::bookings::{
    BookingFilters, BookingLifecycleManager, BookingStats, CreateBookingRequest, CreatedBooking,
    DeleteOutcome, UpdateBookingRequest,
};
use crate::services::pricing::{RentalQuote, TransportQuote};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceEstimateQuery {
    pub truck_id: Uuid,
    pub pickup_city: String,
    pub destination_city: String,
}

#[derive(Debug, Deserialize)]
pub struct RentalEstimateQuery {
    pub truck_id: Uuid,
    pub start_datetime: DateTime<FixedOffset>,
    pub end_datetime: DateTime<FixedOffset>,
}

/// Create a booking (customer)
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<Json<CreatedBooking>> {
    let created = BookingLifecycleManager::from_state(&state)
        .create(&claims, payload)
        .await?;
    Ok(Json(created))
}

/// List the caller's bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filters): Query<BookingFilters>,
) -> AppResult<Json<Vec<booking::Model>>> {
    let bookings = BookingLifecycleManager::from_state(&state)
        .list(&claims, filters)
        .await?;
    Ok(Json(bookings))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<booking::Model>> {
    let booking = BookingLifecycleManager::from_state(&state)
        .get(&claims, id)
        .await?;
    Ok(Json(booking))
}

/// Edit a pending booking (owning customer or admin)
pub async fn update_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingRequest>,
) -> AppResult<Json<booking::Model>> {
    let booking = BookingLifecycleManager::from_state(&state)
        .update(&claims, id, payload)
        .await?;
    Ok(Json(booking))
}

pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<booking::Model>> {
    let booking = BookingLifecycleManager::from_state(&state)
        .update_status(&claims, id, payload.status, payload.notes)
        .await?;
    Ok(Json(booking))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let outcome = BookingLifecycleManager::from_state(&state)
        .delete(&claims, id)
        .await?;

    let message = match outcome {
        DeleteOutcome::SoftDeleted => "Booking removed from your list",
        DeleteOutcome::Deleted => "Booking deleted permanently",
    };
    Ok(Json(json!({ "outcome": outcome, "message": message })))
}

pub async fn booking_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<booking_status_history::Model>>> {
    let history = BookingLifecycleManager::from_state(&state)
        .history(&claims, id)
        .await?;
    Ok(Json(history))
}

/// Booking counts and value (admin)
pub async fn booking_stats(State(state): State<AppState>) -> AppResult<Json<BookingStats>> {
    let stats = BookingLifecycleManager::from_state(&state).stats().await?;
    Ok(Json(stats))
}

pub async fn price_estimate(
    State(state): State<AppState>,
    Query(query): Query<PriceEstimateQuery>,
) -> AppResult<Json<TransportQuote>> {
    let quote = BookingLifecycleManager::from_state(&state)
        .price_estimate(query.truck_id, &query.pickup_city, &query.destination_city)
        .await?;
    Ok(Json(quote))
}

pub async fn rental_price_estimate(
    State(state): State<AppState>,
    Query(query): Query<RentalEstimateQuery>,
) -> AppResult<Json<RentalQuote>> {
    let quote = BookingLifecycleManager::from_state(&state)
        .rental_price_estimate(query.truck_id, query.start_datetime, query.end_datetime)
        .await?;
    Ok(Json(quote))
}
