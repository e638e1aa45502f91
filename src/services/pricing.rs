//! Booking price computation. Both the booking flow and the price preview
//! endpoints go through the functions in this module so a quote always
//! matches the amount charged.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::entities::truck::PricingType;
use crate::error::{AppError, AppResult};
use crate::services::distance::{DistanceInfo, DistanceOracle};

const DAYS_PER_MONTH: i64 = 30;
const MS_PER_HOUR: i64 = 60 * 60 * 1000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Rates a booking is priced from: a live truck or the snapshot kept
/// after the truck was deleted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingBasis {
    pub pricing_type: PricingType,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Distance based price, `None` when the truck has no usable rate.
pub fn transport_price(basis: &PricingBasis, distance_km: Decimal) -> Option<Decimal> {
    match basis.pricing_type {
        PricingType::PerKm => positive(basis.price_per_km).map(|rate| round_money(rate * distance_km)),
        PricingType::Fixed => positive(basis.fixed_price),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportQuote {
    pub total_price: Decimal,
    pub estimated_distance: Option<Decimal>,
    pub duration_min: Option<i64>,
    pub route: Option<String>,
    /// True when the distance came from the static table.
    pub estimated: bool,
    /// True when the configured default price was used.
    pub fallback_applied: bool,
    pub pricing_type: PricingType,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
}

/// Quote a transport job. A failed distance lookup or an unusable rate
/// never fails the quote: the default price is charged and the distance
/// is left empty.
pub async fn quote_transport(
    oracle: &dyn DistanceOracle,
    basis: &PricingBasis,
    origin: &str,
    destination: &str,
    default_price: Decimal,
) -> TransportQuote {
    let lookup = oracle.calculate_distance(origin, destination).await;

    let priced = match lookup {
        Ok(info) => match transport_price(basis, info.distance_km) {
            Some(price) => Some((price, info)),
            None => {
                tracing::warn!(
                    pricing_type = ?basis.pricing_type,
                    price_per_km = ?basis.price_per_km,
                    fixed_price = ?basis.fixed_price,
                    "Truck has no usable rate, using default price"
                );
                None
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                origin,
                destination,
                default_price = %default_price,
                "Distance calculation failed, using default price"
            );
            None
        }
    };

    match priced {
        Some((price, DistanceInfo { distance_km, duration_min, route, estimated })) => TransportQuote {
            total_price: price,
            estimated_distance: Some(distance_km),
            duration_min: Some(duration_min),
            route: Some(route),
            estimated,
            fallback_applied: false,
            pricing_type: basis.pricing_type,
            price_per_km: basis.price_per_km,
            fixed_price: basis.fixed_price,
        },
        None => TransportQuote {
            total_price: default_price,
            estimated_distance: None,
            duration_min: None,
            route: None,
            estimated: true,
            fallback_applied: true,
            pricing_type: basis.pricing_type,
            price_per_km: basis.price_per_km,
            fixed_price: basis.fixed_price,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalBreakdown {
    pub monthly_rate: Decimal,
    pub daily_rate: Option<Decimal>,
    pub months: Option<i64>,
    pub total_days: i64,
    pub calculation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalQuote {
    pub total_price: Decimal,
    pub duration_hours: i64,
    pub duration_days: i64,
    pub duration_months: i64,
    pub breakdown: RentalBreakdown,
}

/// Price a rental window from the equipment's monthly rate.
///
/// Whole months are charged for windows of 30 days or more, shorter
/// windows are prorated at `monthly_rate / 30` per day. Partial days
/// count as a full day.
pub fn quote_rental(
    monthly_rate: Option<Decimal>,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    now: DateTime<Utc>,
) -> AppResult<RentalQuote> {
    let monthly_rate = positive(monthly_rate).ok_or_else(|| {
        AppError::BusinessRule("No monthly rate available for this rental equipment".to_string())
    })?;

    if start >= end {
        return Err(AppError::Validation(
            "End date must be after start date".to_string(),
        ));
    }

    if start.with_timezone(&Utc) < now {
        return Err(AppError::Validation(
            "Start date cannot be in the past".to_string(),
        ));
    }

    let duration_ms = (end - start).num_milliseconds();
    if duration_ms < MS_PER_DAY {
        return Err(AppError::Validation(
            "Minimum rental period is 1 day".to_string(),
        ));
    }

    let duration_hours = div_ceil(duration_ms, MS_PER_HOUR);
    let duration_days = div_ceil(duration_ms, MS_PER_DAY);

    let quote = if duration_days >= DAYS_PER_MONTH {
        let months = div_ceil(duration_days, DAYS_PER_MONTH);
        let total = monthly_rate * Decimal::from(months);
        RentalQuote {
            total_price: total,
            duration_hours,
            duration_days,
            duration_months: months,
            breakdown: RentalBreakdown {
                monthly_rate,
                daily_rate: None,
                months: Some(months),
                total_days: duration_days,
                calculation: format!(
                    "{} × {} month{} = {}",
                    monthly_rate,
                    months,
                    if months > 1 { "s" } else { "" },
                    total
                ),
            },
        }
    } else {
        let daily_rate = monthly_rate / Decimal::from(DAYS_PER_MONTH);
        let total = round_money(daily_rate * Decimal::from(duration_days));
        let shown_rate = round_money(daily_rate);
        RentalQuote {
            total_price: total,
            duration_hours,
            duration_days,
            duration_months: 0,
            breakdown: RentalBreakdown {
                monthly_rate,
                daily_rate: Some(shown_rate),
                months: None,
                total_days: duration_days,
                calculation: format!(
                    "{}/day × {} day{} = {} (prorated from monthly rate)",
                    shown_rate,
                    duration_days,
                    if duration_days > 1 { "s" } else { "" },
                    total
                ),
            },
        }
    };

    Ok(quote)
}

fn div_ceil(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::services::distance::{DistanceError, StaticDistanceTable};

    fn start_in_days(days: i64) -> DateTime<FixedOffset> {
        (Utc::now() + Duration::days(days)).fixed_offset()
    }

    fn per_km(rate: i64) -> PricingBasis {
        PricingBasis {
            pricing_type: PricingType::PerKm,
            price_per_km: Some(Decimal::from(rate)),
            fixed_price: None,
            monthly_rate: None,
        }
    }

    struct FailingOracle;

    #[async_trait::async_trait]
    impl DistanceOracle for FailingOracle {
        async fn calculate_distance(&self, _: &str, _: &str) -> Result<DistanceInfo, DistanceError> {
            Err(DistanceError::Provider("unreachable".to_string()))
        }
    }

    struct FixedOracle(i64);

    #[async_trait::async_trait]
    impl DistanceOracle for FixedOracle {
        async fn calculate_distance(&self, o: &str, d: &str) -> Result<DistanceInfo, DistanceError> {
            Ok(DistanceInfo {
                distance_km: Decimal::from(self.0),
                duration_min: self.0,
                route: format!("{} → {}", o, d),
                estimated: false,
            })
        }
    }

    #[test]
    fn test_rental_whole_months_for_long_windows() {
        let start = start_in_days(1);
        let end = start + Duration::days(45);

        let quote = quote_rental(Some(Decimal::from(900)), start, end, Utc::now()).unwrap();
        assert_eq!(quote.total_price, Decimal::from(1800));
        assert_eq!(quote.duration_days, 45);
        assert_eq!(quote.duration_months, 2);
    }

    #[test]
    fn test_rental_prorated_for_short_windows() {
        let start = start_in_days(1);
        let end = start + Duration::days(10);

        let quote = quote_rental(Some(Decimal::from(900)), start, end, Utc::now()).unwrap();
        assert_eq!(quote.total_price, Decimal::new(30000, 2));
        assert_eq!(quote.duration_hours, 240);
        assert_eq!(quote.duration_months, 0);
    }

    #[test]
    fn test_rental_exactly_thirty_days_is_one_month() {
        let start = start_in_days(2);
        let end = start + Duration::days(30);

        let quote = quote_rental(Some(Decimal::from(900)), start, end, Utc::now()).unwrap();
        assert_eq!(quote.total_price, Decimal::from(900));
    }

    #[test]
    fn test_rental_partial_day_rounds_up_and_money_rounds_half_up() {
        let start = start_in_days(1);
        let end = start + Duration::days(1) + Duration::hours(3);

        // 2 days at 1000/30 = 66.666.. -> 66.67
        let quote = quote_rental(Some(Decimal::from(1000)), start, end, Utc::now()).unwrap();
        assert_eq!(quote.duration_days, 2);
        assert_eq!(quote.total_price, Decimal::new(6667, 2));
    }

    #[test]
    fn test_rental_rejects_bad_windows() {
        let rate = Some(Decimal::from(900));
        let start = start_in_days(3);

        let err = quote_rental(rate, start, start - Duration::days(1), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let past = start_in_days(-3);
        let err = quote_rental(rate, past, past + Duration::days(5), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = quote_rental(rate, start, start + Duration::hours(20), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = quote_rental(None, start, start + Duration::days(5), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::BusinessRule(_)));
    }

    #[test]
    fn test_transport_price_per_km_and_fixed() {
        assert_eq!(transport_price(&per_km(5), Decimal::from(40)), Some(Decimal::from(200)));

        let fixed = PricingBasis {
            pricing_type: PricingType::Fixed,
            price_per_km: Some(Decimal::from(5)),
            fixed_price: Some(Decimal::from(750)),
            monthly_rate: None,
        };
        assert_eq!(transport_price(&fixed, Decimal::from(400)), Some(Decimal::from(750)));

        let unpriced = PricingBasis { price_per_km: None, ..per_km(0) };
        assert_eq!(transport_price(&unpriced, Decimal::from(40)), None);
    }

    #[tokio::test]
    async fn test_quote_uses_oracle_distance() {
        let quote = quote_transport(&FixedOracle(40), &per_km(5), "Rabat", "Fez", Decimal::from(200)).await;

        assert_eq!(quote.total_price, Decimal::from(200));
        assert_eq!(quote.estimated_distance, Some(Decimal::from(40)));
        assert!(!quote.fallback_applied);
    }

    #[tokio::test]
    async fn test_quote_falls_back_when_lookup_fails() {
        let quote = quote_transport(&FailingOracle, &per_km(5), "Rabat", "Fez", Decimal::from(200)).await;

        assert_eq!(quote.total_price, Decimal::from(200));
        assert_eq!(quote.estimated_distance, None);
        assert!(quote.fallback_applied);
    }

    #[tokio::test]
    async fn test_quote_from_static_table() {
        let quote = quote_transport(
            &StaticDistanceTable,
            &per_km(2),
            "Casablanca",
            "Rabat",
            Decimal::from(200),
        )
        .await;

        assert_eq!(quote.estimated_distance, Some(Decimal::from(90)));
        assert_eq!(quote.total_price, Decimal::from(180));
        assert!(quote.estimated);
    }
}
