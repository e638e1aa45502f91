//! Booking state machine and the role rules layered on top of it.
//!
//! Everything here is pure so the rules can be checked without a database.
//! `services::bookings` calls these before touching any row.

use chrono::{DateTime, FixedOffset};

use crate::entities::booking::{BookingStatus, ServiceType};
use crate::entities::truck::TruckStatus;
use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};

/// Statuses reachable from `from` in one step, regardless of who asks.
pub fn next_statuses(from: BookingStatus) -> &'static [BookingStatus] {
    use BookingStatus::*;

    match from {
        PendingReview => &[Approved, Cancelled, Rejected],
        Approved => &[Confirmed, InTransit, Active, Cancelled],
        Confirmed => &[InTransit, Active, Cancelled],
        InTransit => &[Completed, Cancelled],
        Active => &[Completed, Cancelled],
        Completed | Cancelled | Rejected => &[],
    }
}

pub fn is_edge(from: BookingStatus, to: BookingStatus) -> bool {
    next_statuses(from).contains(&to)
}

/// Whether `role` may move a booking from `from` to `to`.
pub fn can_transition(from: BookingStatus, to: BookingStatus, role: UserRole) -> bool {
    is_edge(from, to) && role_permits(from, to, role).is_ok()
}

fn role_permits(from: BookingStatus, to: BookingStatus, role: UserRole) -> AppResult<()> {
    match role {
        UserRole::Admin => Ok(()),
        UserRole::Provider => {
            if to == BookingStatus::Completed {
                return Err(AppError::Forbidden(
                    "Only customers can mark bookings as completed by confirming delivery"
                        .to_string(),
                ));
            }
            Ok(())
        }
        UserRole::Customer => match to {
            BookingStatus::Cancelled if from != BookingStatus::PendingReview => {
                Err(AppError::BusinessRule(
                    "You can only cancel bookings that are in pending review status".to_string(),
                ))
            }
            BookingStatus::Cancelled => Ok(()),
            BookingStatus::Completed
                if !matches!(from, BookingStatus::InTransit | BookingStatus::Active) =>
            {
                Err(AppError::BusinessRule(
                    "You can only confirm delivery when the booking is in transit or return equipment when active"
                        .to_string(),
                ))
            }
            BookingStatus::Completed => Ok(()),
            _ => Err(AppError::Forbidden(
                "Customers can only cancel bookings or confirm delivery".to_string(),
            )),
        },
    }
}

/// Full check for a requested transition: role rules first, then the
/// graph, then the service-specific "running" status.
pub fn check_transition(
    from: BookingStatus,
    to: BookingStatus,
    role: UserRole,
    service_type: ServiceType,
) -> AppResult<()> {
    role_permits(from, to, role)?;

    if !is_edge(from, to) {
        return Err(AppError::BusinessRule(format!(
            "Cannot change booking status from {} to {}",
            from, to
        )));
    }

    match (to, service_type) {
        (BookingStatus::InTransit, ServiceType::Rental) => Err(AppError::BusinessRule(
            "Rental bookings use the active status instead of in_transit".to_string(),
        )),
        (BookingStatus::Active, ServiceType::Transport) => Err(AppError::BusinessRule(
            "Transport bookings use the in_transit status instead of active".to_string(),
        )),
        _ => Ok(()),
    }
}

/// What a transition does to the booked truck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruckEffect {
    None,
    SetStatus(TruckStatus),
    /// Release the truck and credit the booking price to its revenue.
    ReleaseAndCredit,
}

pub fn truck_effect(previous: BookingStatus, next: BookingStatus) -> TruckEffect {
    use BookingStatus::*;

    match next {
        Approved | Confirmed | InTransit | Active => TruckEffect::SetStatus(TruckStatus::Rented),
        Completed => TruckEffect::ReleaseAndCredit,
        Cancelled if matches!(previous, Approved | Confirmed | InTransit | Active) => {
            TruckEffect::SetStatus(TruckStatus::Active)
        }
        _ => TruckEffect::None,
    }
}

/// Soft delete rules for the two booking parties. Admin removal does not
/// go through here.
pub fn check_soft_delete(role: UserRole, status: BookingStatus) -> AppResult<()> {
    use BookingStatus::*;

    let allowed = match role {
        UserRole::Customer => status == PendingReview || status.is_closed(),
        UserRole::Provider => status.is_closed(),
        UserRole::Admin => true,
    };

    if allowed {
        return Ok(());
    }

    let message = match role {
        UserRole::Customer => {
            "You can only delete bookings that are in pending review, cancelled, or completed status"
        }
        _ => "You can only delete cancelled or completed bookings",
    };
    Err(AppError::BusinessRule(message.to_string()))
}

pub fn check_editable(status: BookingStatus) -> AppResult<()> {
    if status != BookingStatus::PendingReview {
        return Err(AppError::BusinessRule(
            "Can only update pending bookings".to_string(),
        ));
    }
    Ok(())
}

/// Half-open `[start, end)` interval intersection.
pub fn rental_windows_overlap(
    a_start: DateTime<FixedOffset>,
    a_end: DateTime<FixedOffset>,
    b_start: DateTime<FixedOffset>,
    b_end: DateTime<FixedOffset>,
) -> bool {
    a_start < b_end && b_start < a_end
}
