pub mod admin;
pub mod auth;
pub mod bookings;
pub mod notifications;
pub mod profile;
pub mod trucks;
