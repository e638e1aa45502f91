pub mod bookings;
pub mod distance;
pub mod fleet;
pub mod lifecycle;
pub mod notifications;
pub mod pricing;
