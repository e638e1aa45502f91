use std::env;

use rust_decimal::Decimal;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    pub google_maps_api_key: Option<String>,
    pub distance_timeout_secs: u64,
    /// Charged when a transport quote cannot be computed.
    pub default_transport_price: Decimal,
    pub notification_poll_secs: u64,
    pub notification_batch_size: u64,
    pub notification_max_attempts: i32,
    pub notification_webhook_url: Option<String>,
    pub admin_email: String,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            google_maps_api_key: optional("GOOGLE_MAPS_API_KEY"),
            distance_timeout_secs: env::var("DISTANCE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("DISTANCE_TIMEOUT_SECS must be a number"),
            default_transport_price: env::var("DEFAULT_TRANSPORT_PRICE")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .expect("DEFAULT_TRANSPORT_PRICE must be a decimal number"),
            notification_poll_secs: env::var("NOTIFICATION_POLL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("NOTIFICATION_POLL_SECS must be a number"),
            notification_batch_size: env::var("NOTIFICATION_BATCH_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .expect("NOTIFICATION_BATCH_SIZE must be a number"),
            notification_max_attempts: env::var("NOTIFICATION_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("NOTIFICATION_MAX_ATTEMPTS must be a number"),
            notification_webhook_url: optional("NOTIFICATION_WEBHOOK_URL"),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@trunklogistics.local".to_string()),
            admin_password: optional("ADMIN_PASSWORD"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Unset and empty variables are both treated as absent.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
