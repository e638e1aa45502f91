//! City to city distance lookups used by transport pricing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::Config;

const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

const SAME_CITY_KM: i64 = 25;
const UNKNOWN_PAIR_KM: i64 = 200;

/// Known city pairs, stored once per direction-independent pair.
const CITY_DISTANCES: &[(&str, &str, i64)] = &[
    ("casablanca", "rabat", 90),
    ("casablanca", "marrakech", 240),
    ("casablanca", "fez", 300),
    ("rabat", "marrakech", 330),
    ("rabat", "fez", 210),
    ("marrakech", "fez", 530),
    ("casablanca", "agadir", 500),
    ("rabat", "agadir", 590),
    ("marrakech", "agadir", 260),
    ("fez", "agadir", 790),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceInfo {
    pub distance_km: Decimal,
    pub duration_min: i64,
    pub route: String,
    /// True when the figure comes from the static table rather than a routing API.
    pub estimated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
    #[error("Origin and destination cities are required")]
    MissingCity,

    #[error("Distance provider error: {0}")]
    Provider(String),
}

#[async_trait]
pub trait DistanceOracle: Send + Sync {
    async fn calculate_distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<DistanceInfo, DistanceError>;
}

fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

fn route_label(origin: &str, destination: &str) -> String {
    format!("{} → {}", origin.trim(), destination.trim())
}

/// Offline estimate from a fixed table of Moroccan city pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDistanceTable;

impl StaticDistanceTable {
    pub fn lookup_km(origin: &str, destination: &str) -> i64 {
        let origin = normalize_city(origin);
        let destination = normalize_city(destination);

        if origin == destination {
            return SAME_CITY_KM;
        }

        CITY_DISTANCES
            .iter()
            .find(|(a, b, _)| {
                (*a == origin && *b == destination) || (*a == destination && *b == origin)
            })
            .map(|(_, _, km)| *km)
            .unwrap_or(UNKNOWN_PAIR_KM)
    }

    pub fn estimate(origin: &str, destination: &str) -> Result<DistanceInfo, DistanceError> {
        if origin.trim().is_empty() || destination.trim().is_empty() {
            return Err(DistanceError::MissingCity);
        }

        let km = Self::lookup_km(origin, destination);
        Ok(DistanceInfo {
            distance_km: Decimal::from(km),
            // 1.5 minutes per km
            duration_min: (km * 3 + 1) / 2,
            route: route_label(origin, destination),
            estimated: true,
        })
    }
}

#[async_trait]
impl DistanceOracle for StaticDistanceTable {
    async fn calculate_distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<DistanceInfo, DistanceError> {
        Self::estimate(origin, destination)
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Debug, Deserialize)]
struct MatrixValue {
    value: f64,
}

/// Google Distance Matrix client. Any API failure degrades to the static table.
pub struct GoogleDistanceOracle {
    api_key: String,
    client: reqwest::Client,
}

impl GoogleDistanceOracle {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, DistanceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DistanceError::Provider(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { api_key, client })
    }

    async fn query_matrix(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<DistanceInfo, DistanceError> {
        let response = self
            .client
            .get(DISTANCE_MATRIX_URL)
            .query(&[
                ("origins", origin),
                ("destinations", destination),
                ("units", "metric"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DistanceError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DistanceError::Provider(format!(
                "Distance Matrix returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: MatrixResponse = response
            .json()
            .await
            .map_err(|e| DistanceError::Provider(format!("Invalid Distance Matrix body: {}", e)))?;

        parse_matrix(body, origin, destination)
    }
}

fn parse_matrix(
    body: MatrixResponse,
    origin: &str,
    destination: &str,
) -> Result<DistanceInfo, DistanceError> {
    if body.status != "OK" {
        return Err(DistanceError::Provider(format!(
            "Google Maps API error: {}",
            body.status
        )));
    }

    let element = body
        .rows
        .first()
        .and_then(|row| row.elements.first())
        .filter(|el| el.status == "OK")
        .ok_or_else(|| {
            DistanceError::Provider(format!(
                "Route not found between {} and {}",
                origin, destination
            ))
        })?;

    let (Some(distance), Some(duration)) = (&element.distance, &element.duration) else {
        return Err(DistanceError::Provider("Incomplete route element".to_string()));
    };

    Ok(DistanceInfo {
        distance_km: Decimal::from((distance.value / 1000.0).round() as i64),
        duration_min: (duration.value / 60.0).round() as i64,
        route: route_label(origin, destination),
        estimated: false,
    })
}

#[async_trait]
impl DistanceOracle for GoogleDistanceOracle {
    async fn calculate_distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<DistanceInfo, DistanceError> {
        if origin.trim().is_empty() || destination.trim().is_empty() {
            return Err(DistanceError::MissingCity);
        }

        match self.query_matrix(origin, destination).await {
            Ok(info) => Ok(info),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    origin,
                    destination,
                    "Distance Matrix lookup failed, using static table"
                );
                StaticDistanceTable::estimate(origin, destination)
            }
        }
    }
}

/// Google when an API key is configured, the static table otherwise.
pub fn from_config(config: &Config) -> Arc<dyn DistanceOracle> {
    let Some(api_key) = config.google_maps_api_key.clone() else {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set, distances come from the static table");
        return Arc::new(StaticDistanceTable);
    };

    match GoogleDistanceOracle::new(api_key, Duration::from_secs(config.distance_timeout_secs)) {
        Ok(oracle) => Arc::new(oracle),
        Err(e) => {
            tracing::error!(error = %e, "Falling back to static distance table");
            Arc::new(StaticDistanceTable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_symmetric_and_case_insensitive() {
        assert_eq!(StaticDistanceTable::lookup_km("Casablanca", "Rabat"), 90);
        assert_eq!(StaticDistanceTable::lookup_km("  RABAT ", "casablanca"), 90);
        assert_eq!(StaticDistanceTable::lookup_km("Agadir", "Fez"), 790);
    }

    #[test]
    fn test_same_city_and_unknown_pair() {
        assert_eq!(StaticDistanceTable::lookup_km("Tangier", "tangier"), 25);
        assert_eq!(StaticDistanceTable::lookup_km("Tangier", "Oujda"), 200);
    }

    #[test]
    fn test_estimate_duration_and_flags() {
        let info = StaticDistanceTable::estimate("Marrakech", "Agadir").unwrap();
        assert_eq!(info.distance_km, Decimal::from(260));
        assert_eq!(info.duration_min, 390);
        assert_eq!(info.route, "Marrakech → Agadir");
        assert!(info.estimated);

        // 25 km * 1.5 = 37.5 rounds up
        let info = StaticDistanceTable::estimate("Rabat", "Rabat").unwrap();
        assert_eq!(info.duration_min, 38);
    }

    #[test]
    fn test_blank_city_is_an_error() {
        assert!(matches!(
            StaticDistanceTable::estimate("", "Rabat"),
            Err(DistanceError::MissingCity)
        ));
        assert!(matches!(
            StaticDistanceTable::estimate("Rabat", "   "),
            Err(DistanceError::MissingCity)
        ));
    }

    #[test]
    fn test_parse_matrix_rounds_units() {
        let body: MatrixResponse = serde_json::from_value(serde_json::json!({
            "status": "OK",
            "rows": [{
                "elements": [{
                    "status": "OK",
                    "distance": { "value": 87_600.0, "text": "87.6 km" },
                    "duration": { "value": 4_170.0, "text": "1 hour 10 mins" }
                }]
            }]
        }))
        .unwrap();

        let info = parse_matrix(body, "Casablanca", "Rabat").unwrap();
        assert_eq!(info.distance_km, Decimal::from(88));
        assert_eq!(info.duration_min, 70);
        assert!(!info.estimated);
    }

    #[test]
    fn test_parse_matrix_rejects_missing_route() {
        let body: MatrixResponse = serde_json::from_value(serde_json::json!({
            "status": "OK",
            "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }]
        }))
        .unwrap();
        assert!(parse_matrix(body, "Casablanca", "Paris").is_err());

        let body: MatrixResponse = serde_json::from_value(serde_json::json!({
            "status": "REQUEST_DENIED"
        }))
        .unwrap();
        assert!(parse_matrix(body, "Casablanca", "Rabat").is_err());
    }
}
