pub mod booking;
pub mod booking_status_history;
pub mod customer_profile;
pub mod notification;
pub mod provider_profile;
pub mod truck;
pub mod user;
