//! Booking notifications.
//!
//! Rows are written to the `notification` table inside the same transaction
//! as the booking change that caused them. The table doubles as an outbox:
//! [`Dispatcher`] polls rows that have not been dispatched yet and hands them
//! to every configured [`NotificationSink`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::booking::{self, BookingStatus};
use crate::entities::notification::{self, NotificationKind, NotificationPriority};
use crate::entities::user::{self, UserRole};
use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub booking_id: Option<Uuid>,
    pub priority: NotificationPriority,
}

impl NewNotification {
    fn into_active_model(self) -> notification::ActiveModel {
        notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(self.user_id),
            kind: Set(self.kind),
            title: Set(self.title),
            message: Set(self.message),
            booking_id: Set(self.booking_id),
            priority: Set(self.priority),
            is_read: Set(false),
            attempts: Set(0),
            last_error: Set(None),
            dispatched_at: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
        }
    }
}

/// Who made a status change, for the message text.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub name: &'a str,
    pub role: UserRole,
}

fn role_label(role: UserRole) -> &'static str {
    match role {
        UserRole::Admin => "admin",
        UserRole::Provider => "provider",
        UserRole::Customer => "customer",
    }
}

fn status_title(status: BookingStatus) -> String {
    let words: Vec<String> = status
        .as_str()
        .split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    format!("Booking {}", words.join(" "))
}

fn status_hint(status: BookingStatus, recipient: UserRole) -> &'static str {
    use BookingStatus::*;

    match (recipient, status) {
        (UserRole::Provider, Approved) => "Booking has been approved and assigned to your truck.",
        (UserRole::Provider, Confirmed) => "You have confirmed the booking.",
        (UserRole::Provider, InTransit) => "Booking is now in transit.",
        (UserRole::Provider, Active) => "Rental is now active.",
        (UserRole::Provider, Completed) => "Booking has been completed.",
        (UserRole::Provider, Cancelled) => "Booking has been cancelled.",
        (UserRole::Provider, Rejected) => "Booking has been rejected.",
        (_, Approved) => "Your booking has been approved and is ready for pickup.",
        (_, Confirmed) => "Your booking has been confirmed by the provider.",
        (_, InTransit) => "Your cargo is now in transit.",
        (_, Active) => "Your equipment rental is now active.",
        (_, Completed) => "Your booking has been completed successfully.",
        (_, Cancelled) => "Your booking has been cancelled.",
        (_, Rejected) => "Your booking has been rejected.",
        (_, PendingReview) => "",
    }
}

pub fn booking_created(customer_user_id: Uuid, b: &booking::Model) -> NewNotification {
    NewNotification {
        user_id: customer_user_id,
        kind: NotificationKind::BookingCreated,
        title: "Booking Request Created".to_string(),
        message: format!(
            "Your booking request for {} has been created and is pending review.",
            b.route_label()
        ),
        booking_id: Some(b.id),
        priority: NotificationPriority::Medium,
    }
}

pub fn provider_booking_request(
    provider_user_id: Uuid,
    customer_name: &str,
    b: &booking::Model,
) -> NewNotification {
    NewNotification {
        user_id: provider_user_id,
        kind: NotificationKind::BookingRequest,
        title: "New Booking Request".to_string(),
        message: format!(
            "New booking request from {} for your truck. Route: {}",
            customer_name,
            b.route_label()
        ),
        booking_id: Some(b.id),
        priority: NotificationPriority::Medium,
    }
}

pub fn admin_booking_request(
    admin_ids: &[Uuid],
    customer_name: &str,
    b: &booking::Model,
) -> Vec<NewNotification> {
    let message = format!(
        "New booking request from {} for {} requires review.",
        customer_name,
        b.route_label()
    );

    admin_ids
        .iter()
        .map(|admin_id| NewNotification {
            user_id: *admin_id,
            kind: NotificationKind::AdminAlert,
            title: "New Booking Request".to_string(),
            message: message.clone(),
            booking_id: Some(b.id),
            priority: NotificationPriority::Medium,
        })
        .collect()
}

/// Status change message for one of the booking parties.
pub fn status_changed(
    recipient_id: Uuid,
    recipient_role: UserRole,
    b: &booking::Model,
    from: BookingStatus,
    to: BookingStatus,
    actor: Actor<'_>,
    notes: Option<&str>,
) -> NewNotification {
    let mut message = format!(
        "Booking #{} status changed from \"{}\" to \"{}\". {}",
        b.reference(),
        from,
        to,
        status_hint(to, recipient_role)
    );
    message.push_str(&format!(" Changed by {}: {}.", role_label(actor.role), actor.name));
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        message.push_str(&format!(" Reason: {}", notes));
    }

    let priority = match to {
        BookingStatus::Cancelled | BookingStatus::Rejected => NotificationPriority::High,
        _ => NotificationPriority::Medium,
    };

    NewNotification {
        user_id: recipient_id,
        kind: NotificationKind::BookingStatus,
        title: status_title(to),
        message,
        booking_id: Some(b.id),
        priority,
    }
}

/// Audit entry for every admin when an admin changed a booking's status.
#[allow(clippy::too_many_arguments)]
pub fn admin_status_changed(
    admin_ids: &[Uuid],
    b: &booking::Model,
    from: BookingStatus,
    to: BookingStatus,
    actor: Actor<'_>,
    customer_name: &str,
    provider_name: &str,
    notes: Option<&str>,
) -> Vec<NewNotification> {
    let mut message = format!(
        "Booking #{} status changed from \"{}\" to \"{}\" by {} {}. Customer: {}, Provider: {}",
        b.reference(),
        from.as_str().replace('_', " "),
        to.as_str().replace('_', " "),
        role_label(actor.role),
        actor.name,
        customer_name,
        provider_name
    );
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        message.push_str(&format!(". Reason: {}", notes));
    }

    admin_ids
        .iter()
        .map(|admin_id| NewNotification {
            user_id: *admin_id,
            kind: NotificationKind::AdminAlert,
            title: "Booking Status Updated".to_string(),
            message: message.clone(),
            booking_id: Some(b.id),
            priority: NotificationPriority::Low,
        })
        .collect()
}

pub fn booking_updated(provider_user_id: Uuid, b: &booking::Model) -> NewNotification {
    NewNotification {
        user_id: provider_user_id,
        kind: NotificationKind::BookingUpdated,
        title: "Booking Updated".to_string(),
        message: format!("Booking #{} has been updated by the customer.", b.reference()),
        booking_id: Some(b.id),
        priority: NotificationPriority::Low,
    }
}

/// Write notifications to the outbox. Runs on whatever connection the
/// caller passes, normally the booking transaction.
pub async fn enqueue<C: ConnectionTrait>(db: &C, items: Vec<NewNotification>) -> AppResult<()> {
    if items.is_empty() {
        return Ok(());
    }

    let count = items.len();
    notification::Entity::insert_many(items.into_iter().map(NewNotification::into_active_model))
        .exec_without_returning(db)
        .await?;

    tracing::debug!(count, "Notifications enqueued");
    Ok(())
}

pub async fn admin_user_ids<C: ConnectionTrait>(db: &C) -> AppResult<Vec<Uuid>> {
    let ids = user::Entity::find()
        .select_only()
        .column(user::Column::Id)
        .filter(user::Column::Role.eq(UserRole::Admin))
        .into_tuple::<Uuid>()
        .all(db)
        .await?;
    Ok(ids)
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Sink returned HTTP {0}")]
    HttpStatus(u16),
}

/// Outbound delivery channel for a stored notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, n: &notification::Model) -> Result<(), SinkError>;
}

/// Writes each notification to the log.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn deliver(&self, n: &notification::Model) -> Result<(), SinkError> {
        tracing::info!(
            notification_id = %n.id,
            user_id = %n.user_id,
            kind = ?n.kind,
            priority = ?n.priority,
            booking_id = ?n.booking_id,
            title = %n.title,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, n: &notification::Model) -> Result<(), SinkError> {
        let payload = serde_json::json!({
            "id": n.id,
            "user_id": n.user_id,
            "kind": n.kind,
            "title": n.title,
            "message": n.message,
            "booking_id": n.booking_id,
            "priority": n.priority,
            "created_at": n.created_at,
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(SinkError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Background worker draining the notification outbox.
pub struct Dispatcher {
    db: DatabaseConnection,
    sinks: Vec<Arc<dyn NotificationSink>>,
    poll_interval: Duration,
    batch_size: u64,
    max_attempts: i32,
}

impl Dispatcher {
    pub fn new(db: DatabaseConnection, sinks: Vec<Arc<dyn NotificationSink>>, config: &Config) -> Self {
        Self {
            db,
            sinks,
            poll_interval: Duration::from_secs(config.notification_poll_secs.max(1)),
            batch_size: config.notification_batch_size.max(1),
            max_attempts: config.notification_max_attempts,
        }
    }

    /// Tracing sink plus the webhook sink when a URL is configured.
    pub fn from_config(db: DatabaseConnection, config: &Config) -> Self {
        let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(TracingSink)];

        if let Some(url) = config.notification_webhook_url.clone() {
            match WebhookSink::new(url) {
                Ok(sink) => sinks.push(Arc::new(sink)),
                Err(e) => tracing::error!(error = %e, "Webhook sink disabled"),
            }
        }

        Self::new(db, sinks, config)
    }

    pub async fn run(self) {
        tracing::info!(
            sinks = ?self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            poll_secs = self.poll_interval.as_secs(),
            "Notification dispatcher started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.dispatch_pending().await {
                tracing::error!(error = %e, "Notification dispatch pass failed");
            }
        }
    }

    /// One pass over the outbox. Returns how many notifications were delivered.
    pub async fn dispatch_pending(&self) -> AppResult<usize> {
        let pending = notification::Entity::find()
            .filter(notification::Column::DispatchedAt.is_null())
            .filter(notification::Column::Attempts.lt(self.max_attempts))
            .order_by_asc(notification::Column::CreatedAt)
            .limit(self.batch_size)
            .all(&self.db)
            .await?;

        let mut delivered = 0;
        for n in pending {
            match self.deliver(&n).await {
                Ok(()) => {
                    notification::Entity::update_many()
                        .col_expr(
                            notification::Column::DispatchedAt,
                            Expr::value(Utc::now().fixed_offset()),
                        )
                        .filter(notification::Column::Id.eq(n.id))
                        .exec(&self.db)
                        .await?;
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = %n.id,
                        attempt = n.attempts + 1,
                        error = %e,
                        "Notification delivery failed"
                    );
                    notification::Entity::update_many()
                        .col_expr(
                            notification::Column::Attempts,
                            Expr::col(notification::Column::Attempts).add(1),
                        )
                        .col_expr(notification::Column::LastError, Expr::value(e.to_string()))
                        .filter(notification::Column::Id.eq(n.id))
                        .exec(&self.db)
                        .await?;
                }
            }
        }

        Ok(delivered)
    }

    async fn deliver(&self, n: &notification::Model) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.deliver(n).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use crate::entities::booking::ServiceType;

    fn sample_booking(service_type: ServiceType) -> booking::Model {
        let now = Utc::now().fixed_offset();
        booking::Model {
            id: Uuid::parse_str("0f3c2a9e-1111-4222-8333-444455556666").unwrap(),
            customer_id: Uuid::new_v4(),
            truck_id: Some(Uuid::new_v4()),
            provider_id: Uuid::new_v4(),
            service_type,
            pickup_address: Some("12 Rue Allal".to_string()),
            pickup_city: Some("Casablanca".to_string()),
            destination_address: Some("4 Avenue Hassan".to_string()),
            destination_city: Some("Rabat".to_string()),
            pickup_date: now.date_naive(),
            pickup_time: None,
            cargo_description: Some("Furniture".to_string()),
            cargo_weight: None,
            cargo_volume: None,
            estimated_distance: None,
            total_price: rust_decimal::Decimal::from(450),
            notes: None,
            status: BookingStatus::PendingReview,
            rental_start: None,
            rental_end: None,
            work_address: Some("Zone Industrielle".to_string()),
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

    fn stored(id: Uuid) -> notification::Model {
        notification::Model {
            id,
            user_id: Uuid::new_v4(),
            kind: NotificationKind::BookingStatus,
            title: "Booking Approved".to_string(),
            message: "approved".to_string(),
            booking_id: None,
            priority: NotificationPriority::Medium,
            is_read: false,
            attempts: 0,
            last_error: None,
            dispatched_at: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl NotificationSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _: &notification::Model) -> Result<(), SinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl NotificationSink for RejectingSink {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn deliver(&self, _: &notification::Model) -> Result<(), SinkError> {
            Err(SinkError::HttpStatus(503))
        }
    }

    fn dispatcher(db: DatabaseConnection, sink: Arc<dyn NotificationSink>) -> Dispatcher {
        Dispatcher {
            db,
            sinks: vec![sink],
            poll_interval: Duration::from_secs(1),
            batch_size: 10,
            max_attempts: 5,
        }
    }

    #[test]
    fn test_created_message_wording() {
        let b = sample_booking(ServiceType::Transport);
        let n = booking_created(Uuid::new_v4(), &b);

        assert_eq!(
            n.message,
            "Your booking request for Casablanca → Rabat has been created and is pending review."
        );
        assert_eq!(n.kind, NotificationKind::BookingCreated);
        assert_eq!(n.booking_id, Some(b.id));
    }

    #[test]
    fn test_rental_messages_use_work_address() {
        let b = sample_booking(ServiceType::Rental);
        let n = provider_booking_request(Uuid::new_v4(), "Sara Alami", &b);

        assert!(n.message.contains("equipment rental at Zone Industrielle"));
    }

    #[test]
    fn test_status_change_message_and_priority() {
        let b = sample_booking(ServiceType::Transport);
        let actor = Actor { name: "Atlas Freight", role: UserRole::Provider };

        let n = status_changed(
            Uuid::new_v4(),
            UserRole::Customer,
            &b,
            BookingStatus::PendingReview,
            BookingStatus::Rejected,
            actor,
            Some("Truck under repair"),
        );

        assert_eq!(n.title, "Booking Rejected");
        assert_eq!(n.priority, NotificationPriority::High);
        assert!(n.message.starts_with(
            "Booking #0f3c2a9e status changed from \"pending_review\" to \"rejected\"."
        ));
        assert!(n.message.contains("Changed by provider: Atlas Freight."));
        assert!(n.message.ends_with("Reason: Truck under repair"));

        let n = status_changed(
            Uuid::new_v4(),
            UserRole::Provider,
            &b,
            BookingStatus::Approved,
            BookingStatus::InTransit,
            actor,
            None,
        );
        assert_eq!(n.title, "Booking In Transit");
        assert_eq!(n.priority, NotificationPriority::Medium);
    }

    #[test]
    fn test_admin_audit_goes_to_every_admin() {
        let b = sample_booking(ServiceType::Transport);
        let admins = [Uuid::new_v4(), Uuid::new_v4()];
        let actor = Actor { name: "Root", role: UserRole::Admin };

        let items = admin_status_changed(
            &admins,
            &b,
            BookingStatus::InTransit,
            BookingStatus::Cancelled,
            actor,
            "Sara Alami",
            "Atlas Freight",
            None,
        );

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|n| n.priority == NotificationPriority::Low));
        assert!(items[0].message.contains("from \"in transit\" to \"cancelled\" by admin Root"));
        assert!(items[0].message.ends_with("Customer: Sara Alami, Provider: Atlas Freight"));
    }

    #[tokio::test]
    async fn test_enqueue_nothing_is_a_no_op() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        enqueue(&db, Vec::new()).await.unwrap();
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_marks_delivered() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored(Uuid::new_v4()), stored(Uuid::new_v4())]])
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .into_connection();

        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let delivered = dispatcher(db, sink.clone()).dispatch_pending().await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_recorded_not_raised() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored(Uuid::new_v4())]])
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .into_connection();

        let delivered = dispatcher(db, Arc::new(RejectingSink)).dispatch_pending().await.unwrap();
        assert_eq!(delivered, 0);
    }
}
