//! Booking lifecycle: creation with pricing, role-gated status transitions
//! and their truck side effects, edits while pending, and the two-party
//! soft delete.
//!
//! Every write runs in one transaction. The booking row (or, for new
//! rentals, the equipment row) is locked first, so the state checks in
//! `services::lifecycle` are evaluated against the row that gets written.
//! Distance lookups happen before the transaction is opened.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::{extension::postgres::PgExpr, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus, ServiceType};
use crate::entities::{booking_status_history, customer_profile, provider_profile, truck, user};
use crate::entities::truck::TruckStatus;
use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::services::distance::DistanceOracle;
use crate::services::fleet::{self, TruckSnapshot};
use crate::services::lifecycle::{self, TruckEffect};
use crate::services::notifications::{self, Actor, NewNotification};
use crate::services::pricing::{self, PricingBasis, RentalQuote, TransportQuote};
use crate::utils::jwt::Claims;
use crate::AppState;

/// Name of the exclusion constraint guarding rental windows.
const RENTAL_OVERLAP_CONSTRAINT: &str = "booking_rental_no_overlap";
const UNAVAILABLE: &str = "Equipment is not available for the selected dates";

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub truck_id: Uuid,
    pub service_type: Option<ServiceType>,
    pub pickup_address: Option<String>,
    pub pickup_city: Option<String>,
    pub destination_address: Option<String>,
    pub destination_city: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_time: Option<String>,
    pub cargo_description: Option<String>,
    pub cargo_weight: Option<Decimal>,
    pub cargo_volume: Option<Decimal>,
    pub notes: Option<String>,
    pub rental_start_datetime: Option<DateTime<FixedOffset>>,
    pub rental_end_datetime: Option<DateTime<FixedOffset>>,
    pub work_address: Option<String>,
    #[serde(default)]
    pub operator_required: bool,
    #[serde(default)]
    pub operator_provided: bool,
    pub purpose_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub pickup_address: Option<String>,
    pub pickup_city: Option<String>,
    pub destination_address: Option<String>,
    pub destination_city: Option<String>,
    pub pickup_date: Option<NaiveDate>,
    pub pickup_time: Option<String>,
    pub cargo_description: Option<String>,
    pub cargo_weight: Option<Decimal>,
    pub cargo_volume: Option<Decimal>,
    pub notes: Option<String>,
    pub rental_start_datetime: Option<DateTime<FixedOffset>>,
    pub rental_end_datetime: Option<DateTime<FixedOffset>>,
    pub work_address: Option<String>,
    pub operator_required: Option<bool>,
    pub operator_provided: Option<bool>,
    pub purpose_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingFilters {
    pub status: Option<BookingStatus>,
    pub service_type: Option<ServiceType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBooking {
    #[serde(flatten)]
    pub booking: booking::Model,
    /// Set when the transport price is the configured default.
    pub price_fallback_applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Hidden for the caller, the other party still sees it.
    SoftDeleted,
    /// Both parties deleted it, row removed.
    Deleted,
}

#[derive(Debug, Serialize)]
pub struct BookingStats {
    pub total_bookings: i64,
    pub by_status: BTreeMap<String, i64>,
    pub average_price: Option<Decimal>,
    pub total_booked_value: Decimal,
    pub completed_revenue: Decimal,
}

/// The caller as seen by the booking rules.
#[derive(Debug, Clone, Copy)]
struct Party {
    user_id: Uuid,
    role: UserRole,
    /// Customer or provider profile id. `None` for admins and for users
    /// who have not created their profile yet.
    profile_id: Option<Uuid>,
}

impl Party {
    fn owns(&self, b: &booking::Model) -> bool {
        match self.role {
            UserRole::Admin => true,
            UserRole::Customer => self.profile_id == Some(b.customer_id),
            UserRole::Provider => self.profile_id == Some(b.provider_id),
        }
    }

    fn has_deleted(&self, b: &booking::Model) -> bool {
        match self.role {
            UserRole::Admin => false,
            UserRole::Customer => b.deleted_by_customer_at.is_some(),
            UserRole::Provider => b.deleted_by_provider_at.is_some(),
        }
    }
}

/// Notification recipients for a booking: (user id, display name).
struct Parties {
    customer: Option<(Uuid, String)>,
    provider: Option<(Uuid, String)>,
}

pub struct BookingLifecycleManager {
    db: DatabaseConnection,
    distance: Arc<dyn DistanceOracle>,
    default_transport_price: Decimal,
}

impl BookingLifecycleManager {
    pub fn new(
        db: DatabaseConnection,
        distance: Arc<dyn DistanceOracle>,
        default_transport_price: Decimal,
    ) -> Self {
        Self {
            db,
            distance,
            default_transport_price,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.db.clone(),
            state.distance.clone(),
            state.config.default_transport_price,
        )
    }

    /// Create a booking for the calling customer. Starts in `pending_review`.
    pub async fn create(&self, claims: &Claims, req: CreateBookingRequest) -> AppResult<CreatedBooking> {
        if claims.role != UserRole::Customer {
            return Err(AppError::Forbidden("Only customers can create bookings".to_string()));
        }

        let profile = customer_profile::Entity::find()
            .filter(customer_profile::Column::UserId.eq(claims.sub))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                AppError::BusinessRule(
                    "Customer profile not found. Please complete your profile first.".to_string(),
                )
            })?;

        let truck = fleet::find_by_id(&self.db, req.truck_id).await?;
        ensure_bookable(&truck)?;

        let service_type = req.service_type.unwrap_or(truck.service_type);
        if service_type != truck.service_type {
            return Err(AppError::Validation(format!(
                "This equipment is listed for {} bookings",
                service_label(truck.service_type)
            )));
        }

        let now = Utc::now();
        let mut fallback_applied = false;
        let mut rental_window = None;

        let new_booking = match service_type {
            ServiceType::Transport => {
                let fields = TransportFields::from_create(&req, &truck)?;
                let quote = pricing::quote_transport(
                    self.distance.as_ref(),
                    &truck.pricing_basis(),
                    &fields.pickup_city,
                    &fields.destination_city,
                    self.default_transport_price,
                )
                .await;
                fallback_applied = quote.fallback_applied;

                booking::ActiveModel {
                    pickup_address: Set(Some(fields.pickup_address)),
                    pickup_city: Set(Some(fields.pickup_city)),
                    destination_address: Set(Some(fields.destination_address)),
                    destination_city: Set(Some(fields.destination_city)),
                    pickup_date: Set(fields.pickup_date),
                    pickup_time: Set(fields.pickup_time),
                    cargo_description: Set(Some(fields.cargo_description)),
                    cargo_weight: Set(Some(fields.cargo_weight)),
                    cargo_volume: Set(fields.cargo_volume),
                    estimated_distance: Set(quote.estimated_distance),
                    total_price: Set(quote.total_price),
                    ..new_booking_base(&profile, &truck, service_type, &req.notes)
                }
            }
            ServiceType::Rental => {
                let (start, end) = match (req.rental_start_datetime, req.rental_end_datetime) {
                    (Some(start), Some(end)) => (start, end),
                    _ => {
                        return Err(AppError::Validation(
                            "Start and end datetime are required".to_string(),
                        ))
                    }
                };
                let quote = pricing::quote_rental(truck.monthly_rate, start, end, now)?;
                rental_window = Some((start, end));

                booking::ActiveModel {
                    pickup_date: Set(start.date_naive()),
                    total_price: Set(quote.total_price),
                    rental_start: Set(Some(start)),
                    rental_end: Set(Some(end)),
                    work_address: Set(trimmed(&req.work_address)),
                    operator_required: Set(req.operator_required),
                    operator_provided: Set(req.operator_provided),
                    rental_duration_hours: Set(Some(to_i32(quote.duration_hours)?)),
                    rental_duration_days: Set(Some(to_i32(quote.duration_days)?)),
                    purpose_description: Set(trimmed(&req.purpose_description)),
                    ..new_booking_base(&profile, &truck, service_type, &req.notes)
                }
            }
        };

        let txn = self.db.begin().await?;

        // Re-read under lock: the truck may have been booked or taken out
        // of service while the price was computed.
        let truck = fleet::find_by_id_locked(&txn, truck.id).await?;
        ensure_bookable(&truck)?;

        if let Some((start, end)) = rental_window {
            ensure_window_free(&txn, truck.id, start, end, None).await?;
        }

        let created = new_booking.insert(&txn).await.map_err(map_overlap)?;

        record_history(&txn, created.id, created.status, Some(claims.sub), Some("Booking created")).await?;

        let parties = load_parties(&txn, &created).await?;
        let customer_name = parties
            .customer
            .as_ref()
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| claims.email.clone());

        let mut outbox = vec![notifications::booking_created(claims.sub, &created)];
        if let Some((provider_user, _)) = parties.provider {
            outbox.push(notifications::provider_booking_request(provider_user, &customer_name, &created));
        }
        let admins = notifications::admin_user_ids(&txn).await?;
        outbox.extend(notifications::admin_booking_request(&admins, &customer_name, &created));
        notifications::enqueue(&txn, outbox).await?;

        txn.commit().await?;

        tracing::info!(
            booking_id = %created.id,
            customer_id = %created.customer_id,
            truck_id = %truck.id,
            service_type = service_label(created.service_type),
            total_price = %created.total_price,
            fallback_applied,
            "Booking created"
        );

        Ok(CreatedBooking {
            booking: created,
            price_fallback_applied: fallback_applied,
        })
    }

    /// Move a booking to `next`. Role, ownership and graph rules are all
    /// checked against the locked row.
    pub async fn update_status(
        &self,
        claims: &Claims,
        booking_id: Uuid,
        next: BookingStatus,
        notes: Option<String>,
    ) -> AppResult<booking::Model> {
        let party = resolve_party(&self.db, claims).await?;

        let txn = self.db.begin().await?;

        let current = booking::Entity::find_by_id(booking_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if !party.owns(&current) {
            return Err(AppError::Forbidden(
                "You do not have permission to update this booking".to_string(),
            ));
        }

        let previous = current.status;
        lifecycle::check_transition(previous, next, party.role, current.service_type)?;

        let mut active: booking::ActiveModel = current.into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now().fixed_offset());
        let updated = active.update(&txn).await?;

        let notes = notes.filter(|n| !n.trim().is_empty());
        record_history(&txn, updated.id, next, Some(claims.sub), notes.as_deref()).await?;

        match (updated.truck_id, lifecycle::truck_effect(previous, next)) {
            (_, TruckEffect::None) => {}
            (None, effect) => {
                tracing::debug!(booking_id = %updated.id, ?effect, "Truck deleted, skipping truck effect");
            }
            (Some(truck_id), TruckEffect::SetStatus(status)) => {
                fleet::set_status(&txn, truck_id, status).await?;
            }
            (Some(truck_id), TruckEffect::ReleaseAndCredit) => {
                fleet::set_status(&txn, truck_id, TruckStatus::Active).await?;
                fleet::update_revenue(&txn, truck_id, updated.total_price).await?;
            }
        }

        let outbox = self
            .status_notifications(&txn, &party, &updated, previous, next, notes.as_deref())
            .await?;
        notifications::enqueue(&txn, outbox).await?;

        txn.commit().await?;

        tracing::info!(
            booking_id = %updated.id,
            from = previous.as_str(),
            to = next.as_str(),
            actor_id = %claims.sub,
            actor_role = ?party.role,
            "Booking status changed"
        );

        Ok(updated)
    }

    async fn status_notifications<C: ConnectionTrait>(
        &self,
        db: &C,
        party: &Party,
        b: &booking::Model,
        from: BookingStatus,
        to: BookingStatus,
        notes: Option<&str>,
    ) -> AppResult<Vec<NewNotification>> {
        let parties = load_parties(db, b).await?;
        let actor_name = display_name(db, party.user_id).await?;
        let actor = Actor {
            name: &actor_name,
            role: party.role,
        };

        let mut outbox = Vec::new();
        if party.role != UserRole::Customer {
            if let Some((user_id, _)) = &parties.customer {
                outbox.push(notifications::status_changed(
                    *user_id,
                    UserRole::Customer,
                    b,
                    from,
                    to,
                    actor,
                    notes,
                ));
            }
        }
        if party.role != UserRole::Provider {
            if let Some((user_id, _)) = &parties.provider {
                outbox.push(notifications::status_changed(
                    *user_id,
                    UserRole::Provider,
                    b,
                    from,
                    to,
                    actor,
                    notes,
                ));
            }
        }
        if party.role == UserRole::Admin {
            let admins = notifications::admin_user_ids(db).await?;
            let name = |p: &Option<(Uuid, String)>| {
                p.as_ref().map(|(_, n)| n.clone()).unwrap_or_else(|| "unknown".to_string())
            };
            outbox.extend(notifications::admin_status_changed(
                &admins,
                b,
                from,
                to,
                actor,
                &name(&parties.customer),
                &name(&parties.provider),
                notes,
            ));
        }

        Ok(outbox)
    }

    /// Edit a booking that is still pending review. A new rental window or
    /// new transport cities are priced again.
    pub async fn update(
        &self,
        claims: &Claims,
        booking_id: Uuid,
        patch: UpdateBookingRequest,
    ) -> AppResult<booking::Model> {
        let party = resolve_party(&self.db, claims).await?;
        if party.role == UserRole::Provider {
            return Err(AppError::Forbidden(
                "Only the customer or an admin can update this booking".to_string(),
            ));
        }

        let current = load_visible(&self.db, &party, booking_id).await?;
        lifecycle::check_editable(current.status)?;

        let live_truck = match current.truck_id {
            Some(truck_id) => truck::Entity::find_by_id(truck_id).one(&self.db).await?,
            None => None,
        };
        let basis = live_truck
            .as_ref()
            .map(|t| t.pricing_basis())
            .or_else(|| TruckSnapshot::from_booking(&current).map(|s| s.pricing_basis()));
        let capacity = live_truck
            .as_ref()
            .and_then(|t| t.capacity_weight)
            .or_else(|| TruckSnapshot::from_booking(&current).and_then(|s| s.capacity_weight));

        let requote = match current.service_type {
            ServiceType::Transport => self.transport_requote(&current, &patch, basis).await?,
            ServiceType::Rental => rental_requote(&current, &patch, basis)?,
        };

        if let Some(weight) = patch.cargo_weight {
            check_cargo_weight(weight, capacity)?;
        }
        if let Some(volume) = patch.cargo_volume {
            check_cargo_volume(volume)?;
        }
        if let Some(time) = patch.pickup_time.as_deref() {
            check_pickup_time(time)?;
        }

        let txn = self.db.begin().await?;

        let locked = booking::Entity::find_by_id(booking_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
        lifecycle::check_editable(locked.status)?;

        if let Requote::Rental { start, end, .. } = &requote {
            if let Some(truck_id) = locked.truck_id {
                fleet::find_by_id_locked(&txn, truck_id).await?;
                ensure_window_free(&txn, truck_id, *start, *end, Some(locked.id)).await?;
            }
        }

        let mut active: booking::ActiveModel = locked.into();
        apply_patch(&mut active, patch)?;
        match requote {
            Requote::None => {}
            Requote::Transport(quote) => {
                active.total_price = Set(quote.total_price);
                active.estimated_distance = Set(quote.estimated_distance);
            }
            Requote::Rental { start, end, quote } => {
                active.rental_start = Set(Some(start));
                active.rental_end = Set(Some(end));
                active.pickup_date = Set(start.date_naive());
                active.total_price = Set(quote.total_price);
                active.rental_duration_hours = Set(Some(to_i32(quote.duration_hours)?));
                active.rental_duration_days = Set(Some(to_i32(quote.duration_days)?));
            }
        }
        active.updated_at = Set(Utc::now().fixed_offset());
        let updated = active.update(&txn).await.map_err(map_overlap)?;

        let parties = load_parties(&txn, &updated).await?;
        if let Some((provider_user, _)) = parties.provider {
            notifications::enqueue(&txn, vec![notifications::booking_updated(provider_user, &updated)])
                .await?;
        }

        txn.commit().await?;

        tracing::info!(booking_id = %updated.id, actor_id = %claims.sub, "Booking updated");
        Ok(updated)
    }

    async fn transport_requote(
        &self,
        current: &booking::Model,
        patch: &UpdateBookingRequest,
        basis: Option<PricingBasis>,
    ) -> AppResult<Requote> {
        let pickup = non_blank(&patch.pickup_city, "pickup_city")?;
        let destination = non_blank(&patch.destination_city, "destination_city")?;

        let changed = |new: &Option<String>, old: &Option<String>| match (new, old) {
            (Some(new), Some(old)) => !new.eq_ignore_ascii_case(old.trim()),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !changed(&pickup, &current.pickup_city) && !changed(&destination, &current.destination_city) {
            return Ok(Requote::None);
        }

        let basis = basis.ok_or_else(|| {
            AppError::BusinessRule("Booking has no pricing basis to recompute the price".to_string())
        })?;
        let origin = pickup.or_else(|| current.pickup_city.clone()).unwrap_or_default();
        let destination = destination
            .or_else(|| current.destination_city.clone())
            .unwrap_or_default();

        let quote = pricing::quote_transport(
            self.distance.as_ref(),
            &basis,
            &origin,
            &destination,
            self.default_transport_price,
        )
        .await;
        Ok(Requote::Transport(quote))
    }

    /// Soft delete for the caller's side of the booking. The row is removed
    /// once both the customer and the provider have deleted it.
    pub async fn delete(&self, claims: &Claims, booking_id: Uuid) -> AppResult<DeleteOutcome> {
        let party = resolve_party(&self.db, claims).await?;
        if party.role == UserRole::Admin {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }

        let txn = self.db.begin().await?;

        let current = booking::Entity::find_by_id(booking_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if !party.owns(&current) {
            return Err(AppError::Forbidden(
                "You do not have permission to delete this booking".to_string(),
            ));
        }
        if party.has_deleted(&current) {
            return Err(AppError::NotFound("Booking not found".to_string()));
        }

        lifecycle::check_soft_delete(party.role, current.status)?;

        let now = Utc::now().fixed_offset();
        let (customer_mark, provider_mark) = match party.role {
            UserRole::Customer => (Some(now), current.deleted_by_provider_at),
            _ => (current.deleted_by_customer_at, Some(now)),
        };

        let outcome = if customer_mark.is_some() && provider_mark.is_some() {
            current.delete(&txn).await?;
            DeleteOutcome::Deleted
        } else {
            let mut active: booking::ActiveModel = current.into();
            active.deleted_by_customer_at = Set(customer_mark);
            active.deleted_by_provider_at = Set(provider_mark);
            active.updated_at = Set(now);
            active.update(&txn).await?;
            DeleteOutcome::SoftDeleted
        };

        txn.commit().await?;

        tracing::info!(
            booking_id = %booking_id,
            actor_role = ?party.role,
            outcome = ?outcome,
            "Booking deleted"
        );
        Ok(outcome)
    }

    pub async fn get(&self, claims: &Claims, booking_id: Uuid) -> AppResult<booking::Model> {
        let party = resolve_party(&self.db, claims).await?;
        load_visible(&self.db, &party, booking_id).await
    }

    /// Status log for a booking, newest first.
    pub async fn history(
        &self,
        claims: &Claims,
        booking_id: Uuid,
    ) -> AppResult<Vec<booking_status_history::Model>> {
        let party = resolve_party(&self.db, claims).await?;
        let b = load_visible(&self.db, &party, booking_id).await?;

        let entries = b
            .find_related(booking_status_history::Entity)
            .order_by_desc(booking_status_history::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(entries)
    }

    pub async fn list(&self, claims: &Claims, filters: BookingFilters) -> AppResult<Vec<booking::Model>> {
        let party = resolve_party(&self.db, claims).await?;

        let mut query = booking::Entity::find();
        query = match (party.role, party.profile_id) {
            (UserRole::Admin, _) => query
                .filter(booking::Column::DeletedByCustomerAt.is_null())
                .filter(booking::Column::DeletedByProviderAt.is_null()),
            (UserRole::Customer, Some(profile_id)) => query
                .filter(booking::Column::CustomerId.eq(profile_id))
                .filter(booking::Column::DeletedByCustomerAt.is_null()),
            (UserRole::Provider, Some(profile_id)) => query
                .filter(booking::Column::ProviderId.eq(profile_id))
                .filter(booking::Column::DeletedByProviderAt.is_null()),
            (_, None) => return Ok(Vec::new()),
        };

        if let Some(status) = filters.status {
            query = query.filter(booking::Column::Status.eq(status));
        }
        if let Some(service_type) = filters.service_type {
            query = query.filter(booking::Column::ServiceType.eq(service_type));
        }
        if let Some(from) = filters.date_from {
            query = query.filter(booking::Column::PickupDate.gte(from));
        }
        if let Some(to) = filters.date_to {
            query = query.filter(booking::Column::PickupDate.lte(to));
        }
        if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query = query.filter(
                Condition::any()
                    .add(Expr::col(booking::Column::PickupCity).ilike(pattern.as_str()))
                    .add(Expr::col(booking::Column::DestinationCity).ilike(pattern.as_str()))
                    .add(Expr::col(booking::Column::CargoDescription).ilike(pattern.as_str()))
                    .add(Expr::col(booking::Column::PurposeDescription).ilike(pattern.as_str()))
                    .add(Expr::col(booking::Column::WorkAddress).ilike(pattern.as_str())),
            );
        }

        let bookings = query
            .order_by_desc(booking::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(bookings)
    }

    pub async fn stats(&self) -> AppResult<BookingStats> {
        let rows = booking::Entity::find()
            .select_only()
            .column(booking::Column::Status)
            .column_as(Expr::col(booking::Column::Id).count(), "count")
            .column_as(Expr::col(booking::Column::TotalPrice).sum(), "value")
            .group_by(booking::Column::Status)
            .into_tuple::<(BookingStatus, i64, Option<Decimal>)>()
            .all(&self.db)
            .await?;

        Ok(summarize(rows))
    }

    /// Preview of the transport price, computed exactly as at creation.
    pub async fn price_estimate(
        &self,
        truck_id: Uuid,
        pickup_city: &str,
        destination_city: &str,
    ) -> AppResult<TransportQuote> {
        let truck = fleet::find_by_id(&self.db, truck_id).await?;
        if truck.service_type != ServiceType::Transport {
            return Err(AppError::BusinessRule(
                "Price estimate is only available for transport trucks".to_string(),
            ));
        }

        Ok(pricing::quote_transport(
            self.distance.as_ref(),
            &truck.pricing_basis(),
            pickup_city,
            destination_city,
            self.default_transport_price,
        )
        .await)
    }

    /// Preview of the rental price, computed exactly as at creation.
    pub async fn rental_price_estimate(
        &self,
        truck_id: Uuid,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> AppResult<RentalQuote> {
        let truck = fleet::find_by_id(&self.db, truck_id).await?;
        if truck.service_type != ServiceType::Rental {
            return Err(AppError::BusinessRule(
                "Price calculation is only available for rental equipment".to_string(),
            ));
        }

        pricing::quote_rental(truck.monthly_rate, start, end, Utc::now())
    }
}

enum Requote {
    None,
    Transport(TransportQuote),
    Rental {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        quote: RentalQuote,
    },
}

fn rental_requote(
    current: &booking::Model,
    patch: &UpdateBookingRequest,
    basis: Option<PricingBasis>,
) -> AppResult<Requote> {
    let start = patch.rental_start_datetime.or(current.rental_start);
    let end = patch.rental_end_datetime.or(current.rental_end);

    if start == current.rental_start && end == current.rental_end {
        return Ok(Requote::None);
    }
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AppError::Validation("Start and end datetime are required".to_string()));
    };

    let monthly_rate = basis.and_then(|b| b.monthly_rate);
    let quote = pricing::quote_rental(monthly_rate, start, end, Utc::now())?;
    Ok(Requote::Rental { start, end, quote })
}

fn apply_patch(active: &mut booking::ActiveModel, patch: UpdateBookingRequest) -> AppResult<()> {
    if let Some(v) = non_blank(&patch.pickup_address, "pickup_address")? {
        active.pickup_address = Set(Some(v));
    }
    if let Some(v) = non_blank(&patch.pickup_city, "pickup_city")? {
        active.pickup_city = Set(Some(v));
    }
    if let Some(v) = non_blank(&patch.destination_address, "destination_address")? {
        active.destination_address = Set(Some(v));
    }
    if let Some(v) = non_blank(&patch.destination_city, "destination_city")? {
        active.destination_city = Set(Some(v));
    }
    if let Some(v) = patch.pickup_date {
        active.pickup_date = Set(v);
    }
    if let Some(v) = patch.pickup_time {
        active.pickup_time = Set(Some(v));
    }
    if let Some(v) = non_blank(&patch.cargo_description, "cargo_description")? {
        active.cargo_description = Set(Some(v));
    }
    if let Some(v) = patch.cargo_weight {
        active.cargo_weight = Set(Some(v));
    }
    if let Some(v) = patch.cargo_volume {
        active.cargo_volume = Set(Some(v));
    }
    if patch.notes.is_some() {
        active.notes = Set(trimmed(&patch.notes));
    }
    if patch.work_address.is_some() {
        active.work_address = Set(trimmed(&patch.work_address));
    }
    if let Some(v) = patch.operator_required {
        active.operator_required = Set(v);
    }
    if let Some(v) = patch.operator_provided {
        active.operator_provided = Set(v);
    }
    if patch.purpose_description.is_some() {
        active.purpose_description = Set(trimmed(&patch.purpose_description));
    }
    Ok(())
}

/// Validated transport fields of a create request.
struct TransportFields {
    pickup_address: String,
    pickup_city: String,
    destination_address: String,
    destination_city: String,
    pickup_date: NaiveDate,
    pickup_time: Option<String>,
    cargo_description: String,
    cargo_weight: Decimal,
    cargo_volume: Option<Decimal>,
}

impl TransportFields {
    fn from_create(req: &CreateBookingRequest, truck: &truck::Model) -> AppResult<Self> {
        let pickup_date = req
            .pickup_date
            .ok_or_else(|| AppError::Validation("pickup_date is required".to_string()))?;
        let cargo_weight = req
            .cargo_weight
            .ok_or_else(|| AppError::Validation("cargo_weight is required".to_string()))?;

        check_cargo_weight(cargo_weight, truck.capacity_weight)?;
        if let Some(volume) = req.cargo_volume {
            check_cargo_volume(volume)?;
        }
        if let Some(time) = req.pickup_time.as_deref() {
            check_pickup_time(time)?;
        }

        Ok(Self {
            pickup_address: required(&req.pickup_address, "pickup_address")?,
            pickup_city: required(&req.pickup_city, "pickup_city")?,
            destination_address: required(&req.destination_address, "destination_address")?,
            destination_city: required(&req.destination_city, "destination_city")?,
            pickup_date,
            pickup_time: req.pickup_time.clone(),
            cargo_description: required(&req.cargo_description, "cargo_description")?,
            cargo_weight,
            cargo_volume: req.cargo_volume,
        })
    }
}

fn new_booking_base(
    profile: &customer_profile::Model,
    truck: &truck::Model,
    service_type: ServiceType,
    notes: &Option<String>,
) -> booking::ActiveModel {
    let now = Utc::now().fixed_offset();
    booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(profile.id),
        truck_id: Set(Some(truck.id)),
        provider_id: Set(truck.provider_id),
        service_type: Set(service_type),
        pickup_address: Set(None),
        pickup_city: Set(None),
        destination_address: Set(None),
        destination_city: Set(None),
        pickup_date: Set(now.date_naive()),
        pickup_time: Set(None),
        cargo_description: Set(None),
        cargo_weight: Set(None),
        cargo_volume: Set(None),
        estimated_distance: Set(None),
        total_price: Set(Decimal::ZERO),
        notes: Set(trimmed(notes)),
        status: Set(BookingStatus::PendingReview),
        rental_start: Set(None),
        rental_end: Set(None),
        work_address: Set(None),
        operator_required: Set(false),
        operator_provided: Set(false),
        rental_duration_hours: Set(None),
        rental_duration_days: Set(None),
        purpose_description: Set(None),
        deleted_truck_info: Set(None),
        deleted_by_customer_at: Set(None),
        deleted_by_provider_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

fn ensure_bookable(truck: &truck::Model) -> AppResult<()> {
    if truck.status != TruckStatus::Active {
        return Err(AppError::BusinessRule(format!(
            "Truck is currently {}",
            truck.status.as_str()
        )));
    }
    Ok(())
}

async fn ensure_window_free<C: ConnectionTrait>(
    db: &C,
    truck_id: Uuid,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let mut query = booking::Entity::find()
        .filter(booking::Column::TruckId.eq(truck_id))
        .filter(booking::Column::ServiceType.eq(ServiceType::Rental))
        .filter(booking::Column::Status.is_not_in(BookingStatus::CLOSED))
        .filter(booking::Column::RentalStart.lt(end))
        .filter(booking::Column::RentalEnd.gt(start));
    if let Some(id) = exclude {
        query = query.filter(booking::Column::Id.ne(id));
    }

    if query.count(db).await? > 0 {
        return Err(AppError::BusinessRule(UNAVAILABLE.to_string()));
    }
    Ok(())
}

/// The database constraint is the last line against overlapping rentals.
fn map_overlap(e: DbErr) -> AppError {
    if e.to_string().contains(RENTAL_OVERLAP_CONSTRAINT) {
        AppError::BusinessRule(UNAVAILABLE.to_string())
    } else {
        AppError::Database(e)
    }
}

async fn record_history<C: ConnectionTrait>(
    db: &C,
    booking_id: Uuid,
    status: BookingStatus,
    changed_by: Option<Uuid>,
    notes: Option<&str>,
) -> AppResult<()> {
    booking_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking_id),
        status: Set(status),
        changed_by: Set(changed_by),
        notes: Set(notes.map(str::to_string)),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?;
    Ok(())
}

async fn resolve_party<C: ConnectionTrait>(db: &C, claims: &Claims) -> AppResult<Party> {
    let profile_id = match claims.role {
        UserRole::Admin => None,
        UserRole::Customer => customer_profile::Entity::find()
            .filter(customer_profile::Column::UserId.eq(claims.sub))
            .one(db)
            .await?
            .map(|p| p.id),
        UserRole::Provider => provider_profile::Entity::find()
            .filter(provider_profile::Column::UserId.eq(claims.sub))
            .one(db)
            .await?
            .map(|p| p.id),
    };

    Ok(Party {
        user_id: claims.sub,
        role: claims.role,
        profile_id,
    })
}

/// Fetch a booking the party may see. Someone else's booking is a 403,
/// a booking the party already deleted is a 404.
async fn load_visible<C: ConnectionTrait>(db: &C, party: &Party, id: Uuid) -> AppResult<booking::Model> {
    let b = booking::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if !party.owns(&b) {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    if party.has_deleted(&b) {
        return Err(AppError::NotFound("Booking not found".to_string()));
    }
    Ok(b)
}

async fn load_parties<C: ConnectionTrait>(db: &C, b: &booking::Model) -> AppResult<Parties> {
    let customer = match customer_profile::Entity::find_by_id(b.customer_id).one(db).await? {
        Some(profile) => user::Entity::find_by_id(profile.user_id)
            .one(db)
            .await?
            .map(|u| (u.id, u.display_name())),
        None => None,
    };

    let provider = provider_profile::Entity::find_by_id(b.provider_id)
        .one(db)
        .await?
        .map(|p| (p.user_id, p.company_name));

    Ok(Parties { customer, provider })
}

async fn display_name<C: ConnectionTrait>(db: &C, user_id: Uuid) -> AppResult<String> {
    Ok(user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .map(|u| u.display_name())
        .unwrap_or_else(|| "unknown".to_string()))
}

fn summarize(rows: Vec<(BookingStatus, i64, Option<Decimal>)>) -> BookingStats {
    let mut by_status = BTreeMap::new();
    let mut total_bookings = 0;
    let mut total_booked_value = Decimal::ZERO;
    let mut completed_revenue = Decimal::ZERO;

    for (status, count, value) in rows {
        let value = value.unwrap_or(Decimal::ZERO);
        by_status.insert(status.as_str().to_string(), count);
        total_bookings += count;
        total_booked_value += value;
        if status == BookingStatus::Completed {
            completed_revenue += value;
        }
    }

    let average_price = (total_bookings > 0).then(|| {
        (total_booked_value / Decimal::from(total_bookings))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    });

    BookingStats {
        total_bookings,
        by_status,
        average_price,
        total_booked_value,
        completed_revenue,
    }
}

fn check_cargo_weight(weight: Decimal, capacity: Option<Decimal>) -> AppResult<()> {
    if weight <= Decimal::ZERO {
        return Err(AppError::Validation("cargo_weight must be greater than 0".to_string()));
    }
    if let Some(capacity) = capacity {
        if weight > capacity {
            return Err(AppError::BusinessRule(format!(
                "Cargo weight {} kg exceeds truck capacity of {} kg",
                weight, capacity
            )));
        }
    }
    Ok(())
}

fn check_cargo_volume(volume: Decimal) -> AppResult<()> {
    if volume < Decimal::ZERO {
        return Err(AppError::Validation("cargo_volume cannot be negative".to_string()));
    }
    Ok(())
}

fn check_pickup_time(time: &str) -> AppResult<()> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| AppError::Validation("pickup_time must be in HH:MM format".to_string()))
}

fn required(value: &Option<String>, field: &str) -> AppResult<String> {
    trimmed(value).ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

/// `None` when absent, an error when present but blank.
fn non_blank(value: &Option<String>, field: &str) -> AppResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(_) => required(value, field).map(Some),
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn to_i32(value: i64) -> AppResult<i32> {
    i32::try_from(value).map_err(|_| AppError::Validation("Rental period is too long".to_string()))
}

fn service_label(service_type: ServiceType) -> &'static str {
    match service_type {
        ServiceType::Transport => "transport",
        ServiceType::Rental => "rental",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};

    use crate::entities::truck::PricingType;
    use crate::services::distance::{DistanceError, DistanceInfo, StaticDistanceTable};

    struct FortyKm;

    #[async_trait::async_trait]
    impl DistanceOracle for FortyKm {
        async fn calculate_distance(
            &self,
            origin: &str,
            destination: &str,
        ) -> Result<DistanceInfo, DistanceError> {
            Ok(DistanceInfo {
                distance_km: Decimal::from(40),
                duration_min: 45,
                route: format!("{} → {}", origin, destination),
                estimated: false,
            })
        }
    }

    fn exec_ok() -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("num_items", Value::BigInt(Some(n)))])
    }

    /// SQL and bound values of every statement the connection saw.
    fn logged_statements(db: DatabaseConnection) -> Vec<String> {
        format!("{:?}", db.into_transaction_log())
            .replace("\\\"", "\"")
            .split("Statement {")
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn user_for(id: Uuid, role: UserRole) -> user::Model {
        user::Model {
            id,
            email: "someone@example.com".to_string(),
            password_hash: String::new(),
            first_name: "Salma".to_string(),
            last_name: "Idrissi".to_string(),
            phone: None,
            role,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn history_for(b: &booking::Model) -> booking_status_history::Model {
        booking_status_history::Model {
            id: Uuid::new_v4(),
            booking_id: b.id,
            status: b.status,
            changed_by: None,
            notes: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    fn rental_truck() -> truck::Model {
        let mut truck = truck_with_status(TruckStatus::Active);
        truck.service_type = ServiceType::Rental;
        truck.monthly_rate = Some(Decimal::from(900));
        truck
    }

    fn rental_request(truck_id: Uuid) -> CreateBookingRequest {
        let start = (Utc::now() + chrono::Duration::days(3)).fixed_offset();
        CreateBookingRequest {
            service_type: Some(ServiceType::Rental),
            rental_start_datetime: Some(start),
            rental_end_datetime: Some(start + chrono::Duration::days(10)),
            work_address: Some("Zone industrielle, Ain Sebaa".to_string()),
            ..transport_request(truck_id)
        }
    }

    fn claims(role: UserRole) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role,
            exp: 0,
            iat: 0,
        }
    }

    fn manager(db: DatabaseConnection) -> BookingLifecycleManager {
        BookingLifecycleManager::new(db, Arc::new(StaticDistanceTable), Decimal::from(200))
    }

    fn customer_profile_for(user_id: Uuid) -> customer_profile::Model {
        let now = Utc::now().fixed_offset();
        customer_profile::Model {
            id: Uuid::new_v4(),
            user_id,
            company_name: None,
            address: None,
            city: Some("Casablanca".to_string()),
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn provider_profile_for(user_id: Uuid) -> provider_profile::Model {
        let now = Utc::now().fixed_offset();
        provider_profile::Model {
            id: Uuid::new_v4(),
            user_id,
            company_name: "Atlas Freight".to_string(),
            business_license: None,
            address: None,
            city: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn truck_with_status(status: TruckStatus) -> truck::Model {
        let now = Utc::now().fixed_offset();
        truck::Model {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            service_type: ServiceType::Transport,
            truck_type: "flatbed".to_string(),
            license_plate: "4521-B-7".to_string(),
            make: None,
            model: None,
            year: None,
            capacity_weight: Some(Decimal::from(5000)),
            capacity_volume: None,
            pricing_type: PricingType::PerKm,
            price_per_km: Some(Decimal::from(5)),
            fixed_price: None,
            monthly_rate: None,
            status,
            total_revenue: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    fn booking_in(status: BookingStatus, customer_id: Uuid, provider_id: Uuid) -> booking::Model {
        let now = Utc::now().fixed_offset();
        booking::Model {
            id: Uuid::new_v4(),
            customer_id,
            truck_id: Some(Uuid::new_v4()),
            provider_id,
            service_type: ServiceType::Transport,
            pickup_address: Some("1 Rue A".to_string()),
            pickup_city: Some("Casablanca".to_string()),
            destination_address: Some("2 Rue B".to_string()),
            destination_city: Some("Rabat".to_string()),
            pickup_date: now.date_naive(),
            pickup_time: None,
            cargo_description: Some("Boxes".to_string()),
            cargo_weight: Some(Decimal::from(100)),
            cargo_volume: None,
            estimated_distance: Some(Decimal::from(90)),
            total_price: Decimal::from(450),
            notes: None,
            status,
            rental_start: None,
            rental_end: None,
            work_address: None,
            operator_required: false,
            operator_provided: false,
            rental_duration_hours: None,
            rental_duration_days: None,
            purpose_description: None,
            deleted_truck_info: None,
            deleted_by_customer_at: None,
            deleted_by_provider_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transport_request(truck_id: Uuid) -> CreateBookingRequest {
        CreateBookingRequest {
            truck_id,
            service_type: None,
            pickup_address: Some("1 Rue A".to_string()),
            pickup_city: Some("Casablanca".to_string()),
            destination_address: Some("2 Rue B".to_string()),
            destination_city: Some("Rabat".to_string()),
            pickup_date: Some(Utc::now().date_naive()),
            pickup_time: Some("09:30".to_string()),
            cargo_description: Some("Boxes".to_string()),
            cargo_weight: Some(Decimal::from(100)),
            cargo_volume: None,
            notes: None,
            rental_start_datetime: None,
            rental_end_datetime: None,
            work_address: None,
            operator_required: false,
            operator_provided: false,
            purpose_description: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_customer_profile() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<customer_profile::Model>::new()])
            .into_connection();

        let err = manager(db)
            .create(&claims(UserRole::Customer), transport_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(msg) if msg.contains("complete your profile")));
    }

    #[tokio::test]
    async fn test_create_rejects_unavailable_truck() {
        let caller = claims(UserRole::Customer);
        let truck = truck_with_status(TruckStatus::Maintenance);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![customer_profile_for(caller.sub)]])
            .append_query_results([vec![truck.clone()]])
            .into_connection();

        let err = manager(db)
            .create(&caller, transport_request(truck.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(msg) if msg == "Truck is currently maintenance"));
    }

    #[tokio::test]
    async fn test_create_rejects_overweight_cargo() {
        let caller = claims(UserRole::Customer);
        let truck = truck_with_status(TruckStatus::Active);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![customer_profile_for(caller.sub)]])
            .append_query_results([vec![truck.clone()]])
            .into_connection();

        let mut req = transport_request(truck.id);
        req.cargo_weight = Some(Decimal::from(9000));

        let err = manager(db).create(&caller, req).await.unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn test_create_is_customer_only() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = manager(db)
            .create(&claims(UserRole::Provider), transport_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_status_update_on_missing_booking() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<booking::Model>::new()])
            .into_connection();

        let err = manager(db)
            .update_status(&claims(UserRole::Admin), Uuid::new_v4(), BookingStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_provider_cannot_complete() {
        let caller = claims(UserRole::Provider);
        let profile = provider_profile_for(caller.sub);
        let b = booking_in(BookingStatus::InTransit, Uuid::new_v4(), profile.id);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .into_connection();

        let err = manager(db)
            .update_status(&caller, b.id, BookingStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_after_approval() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let b = booking_in(BookingStatus::Approved, profile.id, Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .into_connection();

        let err = manager(db)
            .update_status(&caller, b.id, BookingStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn test_other_providers_booking_is_forbidden() {
        let caller = claims(UserRole::Provider);
        let profile = provider_profile_for(caller.sub);
        let b = booking_in(BookingStatus::PendingReview, Uuid::new_v4(), Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .into_connection();

        let err = manager(db)
            .update_status(&caller, b.id, BookingStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_customer_cannot_delete_running_booking() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let b = booking_in(BookingStatus::InTransit, profile.id, Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .into_connection();

        let err = manager(db).delete(&caller, b.id).await.unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[tokio::test]
    async fn test_provider_cannot_edit() {
        let caller = claims(UserRole::Provider);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![provider_profile_for(caller.sub)]])
            .into_connection();

        let err = manager(db)
            .update(&caller, Uuid::new_v4(), UpdateBookingRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_list_without_profile_is_empty() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<customer_profile::Model>::new()])
            .into_connection();

        let bookings = manager(db)
            .list(&claims(UserRole::Customer), BookingFilters::default())
            .await
            .unwrap();
        assert!(bookings.is_empty());
    }

    #[tokio::test]
    async fn test_transport_booking_is_priced_per_km_and_pending() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let provider = provider_profile_for(Uuid::new_v4());
        let truck = truck_with_status(TruckStatus::Active);
        let mut stored = booking_in(BookingStatus::PendingReview, profile.id, provider.id);
        stored.truck_id = Some(truck.id);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile.clone()]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![stored.clone()]])
            .append_query_results([vec![history_for(&stored)]])
            .append_query_results([vec![profile.clone()]])
            .append_query_results([vec![user_for(caller.sub, UserRole::Customer)]])
            .append_query_results([vec![provider]])
            .append_query_results([Vec::<user::Model>::new()])
            .append_exec_results([exec_ok()])
            .into_connection();

        // default price differs from 5/km * 40 km so a fallback would show
        let created = BookingLifecycleManager::new(db.clone(), Arc::new(FortyKm), Decimal::from(999))
            .create(&caller, transport_request(truck.id))
            .await
            .unwrap();
        assert!(!created.price_fallback_applied);

        let statements = logged_statements(db);
        let insert = statements
            .iter()
            .find(|s| s.contains(r#"INSERT INTO "booking""#))
            .unwrap();
        assert!(insert.contains("Decimal(Some(200))"));
        assert!(insert.contains("Decimal(Some(40))"));
        assert!(insert.contains(r#""pending_review""#));
        assert!(statements
            .iter()
            .any(|s| s.contains(r#"INSERT INTO "booking_status_history""#)));
        assert!(statements.iter().any(|s| s.contains(r#"INSERT INTO "notification""#)));
    }

    #[tokio::test]
    async fn test_overlapping_rental_is_rejected() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let truck = rental_truck();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![count_row(1)]])
            .into_connection();

        let err = manager(db.clone())
            .create(&caller, rental_request(truck.id))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(matches!(err, AppError::BusinessRule(msg) if msg == UNAVAILABLE));

        let statements = logged_statements(db);
        assert!(statements.iter().any(|s| s.contains("FOR UPDATE")));
        assert!(!statements.iter().any(|s| s.contains(r#"INSERT INTO "booking""#)));
    }

    #[tokio::test]
    async fn test_rental_keeps_operator_flags() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let provider = provider_profile_for(Uuid::new_v4());
        let truck = rental_truck();
        let mut stored = booking_in(BookingStatus::PendingReview, profile.id, provider.id);
        stored.service_type = ServiceType::Rental;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile.clone()]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![truck.clone()]])
            .append_query_results([vec![count_row(0)]])
            .append_query_results([vec![stored.clone()]])
            .append_query_results([vec![history_for(&stored)]])
            .append_query_results([vec![profile]])
            .append_query_results([vec![user_for(caller.sub, UserRole::Customer)]])
            .append_query_results([vec![provider]])
            .append_query_results([Vec::<user::Model>::new()])
            .append_exec_results([exec_ok()])
            .into_connection();

        let mut req = rental_request(truck.id);
        req.operator_required = false;
        req.operator_provided = true;

        manager(db.clone()).create(&caller, req).await.unwrap();

        let statements = logged_statements(db);
        let insert = statements
            .iter()
            .find(|s| s.contains(r#"INSERT INTO "booking""#))
            .unwrap();
        assert!(insert.contains("Bool(Some(true))"));
        // 10 days at 900 a month
        assert!(insert.contains("Decimal(Some(300"));
    }

    #[tokio::test]
    async fn test_completion_releases_truck_and_credits_revenue_once() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let provider = provider_profile_for(Uuid::new_v4());
        let b = booking_in(BookingStatus::InTransit, profile.id, provider.id);
        let mut done = b.clone();
        done.status = BookingStatus::Completed;
        let customer_user = user_for(caller.sub, UserRole::Customer);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile.clone()]])
            .append_query_results([vec![b.clone()]])
            .append_query_results([vec![done.clone()]])
            .append_query_results([vec![history_for(&done)]])
            .append_query_results([vec![profile]])
            .append_query_results([vec![customer_user.clone()]])
            .append_query_results([vec![provider]])
            .append_query_results([vec![customer_user]])
            .append_exec_results([exec_ok(), exec_ok(), exec_ok()])
            .into_connection();

        let updated = manager(db.clone())
            .update_status(&caller, b.id, BookingStatus::Completed, Some("Delivered".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.status, BookingStatus::Completed);

        let statements = logged_statements(db);
        let truck_updates: Vec<&String> = statements
            .iter()
            .filter(|s| s.contains(r#"UPDATE "truck""#))
            .collect();
        assert_eq!(truck_updates.len(), 2);
        assert!(truck_updates.iter().any(|s| s.contains(r#""active""#)));

        let credits: Vec<&&String> = truck_updates
            .iter()
            .filter(|s| s.contains(r#""total_revenue" +"#))
            .collect();
        assert_eq!(credits.len(), 1);
        assert!(credits[0].contains("Decimal(Some(450))"));
    }

    #[tokio::test]
    async fn test_first_delete_only_hides_booking() {
        let caller = claims(UserRole::Customer);
        let profile = customer_profile_for(caller.sub);
        let b = booking_in(BookingStatus::PendingReview, profile.id, Uuid::new_v4());
        let mut hidden = b.clone();
        hidden.deleted_by_customer_at = Some(Utc::now().fixed_offset());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .append_query_results([vec![hidden]])
            .into_connection();

        let outcome = manager(db.clone()).delete(&caller, b.id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::SoftDeleted);

        let statements = logged_statements(db);
        assert!(statements.iter().any(|s| s.contains(r#"UPDATE "booking""#)));
        assert!(!statements.iter().any(|s| s.contains(r#"DELETE FROM "booking""#)));
    }

    #[tokio::test]
    async fn test_second_party_delete_removes_row() {
        let caller = claims(UserRole::Provider);
        let profile = provider_profile_for(caller.sub);
        let mut b = booking_in(BookingStatus::Completed, Uuid::new_v4(), profile.id);
        b.deleted_by_customer_at = Some(Utc::now().fixed_offset());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![profile]])
            .append_query_results([vec![b.clone()]])
            .append_exec_results([exec_ok()])
            .into_connection();

        let outcome = manager(db.clone()).delete(&caller, b.id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);

        let statements = logged_statements(db);
        assert!(statements.iter().any(|s| s.contains(r#"DELETE FROM "booking""#)));
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_bookings() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = manager(db.clone())
            .delete(&claims(UserRole::Admin), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(logged_statements(db).is_empty());
    }

    #[test]
    fn test_patch_sets_operator_provided() {
        let b = booking_in(BookingStatus::PendingReview, Uuid::new_v4(), Uuid::new_v4());
        let mut active: booking::ActiveModel = b.into();

        let patch = UpdateBookingRequest {
            operator_provided: Some(true),
            ..Default::default()
        };
        apply_patch(&mut active, patch).unwrap();

        assert_eq!(active.operator_provided, Set(true));
        assert_eq!(active.operator_required, sea_orm::ActiveValue::Unchanged(false));
    }

    #[test]
    fn test_stats_summary() {
        let stats = summarize(vec![
            (BookingStatus::Completed, 2, Some(Decimal::from(1000))),
            (BookingStatus::PendingReview, 1, Some(Decimal::from(200))),
            (BookingStatus::Cancelled, 1, None),
        ]);

        assert_eq!(stats.total_bookings, 4);
        assert_eq!(stats.by_status["completed"], 2);
        assert_eq!(stats.total_booked_value, Decimal::from(1200));
        assert_eq!(stats.completed_revenue, Decimal::from(1000));
        assert_eq!(stats.average_price, Some(Decimal::from(300)));

        assert_eq!(summarize(Vec::new()).average_price, None);
    }

    #[test]
    fn test_party_visibility() {
        let profile_id = Uuid::new_v4();
        let customer = Party {
            user_id: Uuid::new_v4(),
            role: UserRole::Customer,
            profile_id: Some(profile_id),
        };
        let mut b = booking_in(BookingStatus::Completed, profile_id, Uuid::new_v4());

        assert!(customer.owns(&b));
        assert!(!customer.has_deleted(&b));

        b.deleted_by_customer_at = Some(Utc::now().fixed_offset());
        assert!(customer.has_deleted(&b));

        let stranger = Party { profile_id: Some(Uuid::new_v4()), ..customer };
        assert!(!stranger.owns(&b));
    }

    #[test]
    fn test_field_helpers() {
        assert!(check_pickup_time("09:30").is_ok());
        assert!(check_pickup_time("9h30").is_err());
        assert!(check_cargo_weight(Decimal::ZERO, None).is_err());
        assert!(check_cargo_volume(Decimal::from(-1)).is_err());
        assert_eq!(non_blank(&None, "x").unwrap(), None);
        assert!(non_blank(&Some("  ".to_string()), "x").is_err());
        assert_eq!(trimmed(&Some(" Rabat ".to_string())), Some("Rabat".to_string()));
    }
}
