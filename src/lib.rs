//! Async client for the [Amber Electric](https://www.amber.com.au) price API.
//!
//! ```no_run
//! # async fn run() -> Result<(), amber_api::AmberError> {
//! let client = amber_api::AmberClient::new("psk_...")?;
//!
//! for site in client.get_sites().await? {
//!     let forecast = client.get_forecast_general_prices(&site).await?;
//!     println!("{}: {} forecast intervals", site.nmi, forecast.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every operation is a single request. Dropping the returned future cancels it,
//! and `tokio::time::timeout` can be used to impose a deadline shorter than the
//! client's transport timeout.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

mod client;

pub use client::{AmberClient, ClientBuilder, DEFAULT_TIMEOUT};

/// Root of version 1 of the Amber API.
pub const BASE_URL_V1: &str = "https://api.amber.com.au/v1";

/// Format of the `startDate`/`endDate` query parameters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Interval type of forecast prices.
pub const FORECAST_INTERVAL: &str = "ForecastInterval";

/// Channel type of grid consumption.
pub const GENERAL_CHANNEL: &str = "general";

/// A metering site linked to the API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    /// National Metering Identifier
    pub nmi: String,
}

/// Price of a single interval on one channel of a site.
///
/// Fields missing from a response, like `estimate` on actual intervals, are
/// left at their default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Price {
    /// `ForecastInterval`, `CurrentInterval` or `ActualInterval`
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    /// Length of the interval in minutes
    pub duration: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// End of the interval in market time (AEST)
    pub nem_time: String,
    /// Price in c/kWh including network charges
    pub per_kwh: f64,
    /// Renewables share of the grid in percent
    pub renewables: f64,
    /// Wholesale spot price in c/kWh
    pub spot_per_kwh: f64,
    /// `general`, `controlledLoad` or `feedIn`
    pub channel_type: String,
    pub spike_status: String,
    /// Whether the price is still provisional
    pub estimate: bool,
}

impl Price {
    pub fn is_forecast(&self) -> bool {
        self.kind == FORECAST_INTERVAL
    }

    pub fn is_general(&self) -> bool {
        self.channel_type == GENERAL_CHANNEL
    }
}

#[derive(Error, Debug)]
pub enum AmberError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Non-success status. The message is the one sent by the API if the body
    /// could be read as an error response.
    #[error("{message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("api responded with an unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AmberError {
    /// HTTP status of an error reported by the API.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            AmberError::Api { status, .. } => Some(*status),
            AmberError::Reqwest(e) => e.status(),
            _ => None,
        }
    }

    /// Returns `true` for transport failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AmberError::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Returns the `startDate` and `endDate` used to query forecast prices at `now`.
///
/// The end date is `now` + 24 hours, not the calendar day after `now`.
pub fn forecast_window<Tz>(now: DateTime<Tz>) -> (String, String)
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let end = now.clone() + Duration::hours(24);

    (
        now.format(DATE_FORMAT).to_string(),
        end.format(DATE_FORMAT).to_string(),
    )
}

/// Keeps only general channel forecast prices, ordered by start time.
///
/// The sort is stable, prices starting at the same time keep their order.
pub fn general_forecast(prices: Vec<Price>) -> Vec<Price> {
    let mut forecast = prices
        .into_iter()
        .filter(|price| price.is_forecast() && price.is_general())
        .collect::<Vec<_>>();

    forecast.sort_by_key(|price| price.start_time);
    forecast
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn price(kind: &str, channel_type: &str, start_minute: u32) -> Price {
        let start_time = Utc.with_ymd_and_hms(2021, 5, 5, 2, start_minute, 0).unwrap();

        Price {
            kind: kind.to_owned(),
            date: "2021-05-05".to_owned(),
            duration: 30,
            start_time,
            end_time: start_time + Duration::minutes(30),
            nem_time: "2021-05-05T12:30:00+10:00".to_owned(),
            per_kwh: 23.16,
            renewables: 42.0,
            spot_per_kwh: 6.12,
            channel_type: channel_type.to_owned(),
            spike_status: "none".to_owned(),
            estimate: true,
        }
    }

    #[test]
    fn test_price_from_json() {
        let json = r#"{
            "type": "CurrentInterval",
            "date": "2021-05-05",
            "duration": 30,
            "startTime": "2021-05-05T02:00:01Z",
            "endTime": "2021-05-05T02:30:00Z",
            "nemTime": "2021-05-05T12:30:00+10:00",
            "perKwh": 23.16,
            "renewables": 42,
            "spotPerKwh": 6.12,
            "channelType": "general",
            "spikeStatus": "none",
            "estimate": true
        }"#;

        let price: Price = serde_json::from_str(json).unwrap();

        assert_eq!(price.kind, "CurrentInterval");
        assert_eq!(price.duration, 30);
        assert_eq!(
            price.start_time,
            Utc.with_ymd_and_hms(2021, 5, 5, 2, 0, 1).unwrap()
        );
        assert_eq!(price.per_kwh, 23.16);
        assert_eq!(price.renewables, 42.0);
        assert_eq!(price.channel_type, "general");
        assert!(price.estimate);
        assert!(!price.is_forecast());
        assert!(price.is_general());
    }

    #[test]
    fn test_price_start_time_with_offset() {
        let json = r#"{
            "type": "ForecastInterval",
            "date": "2021-05-05",
            "duration": 30,
            "startTime": "2021-05-05T12:00:00+10:00",
            "endTime": "2021-05-05T12:30:00+10:00",
            "nemTime": "2021-05-05T12:30:00+10:00",
            "perKwh": -1.5,
            "renewables": 80.5,
            "spotPerKwh": -9.0,
            "channelType": "feedIn",
            "spikeStatus": "none",
            "estimate": false
        }"#;

        let price: Price = serde_json::from_str(json).unwrap();

        assert_eq!(
            price.start_time,
            Utc.with_ymd_and_hms(2021, 5, 5, 2, 0, 0).unwrap()
        );
        assert_eq!(price.per_kwh, -1.5);
        assert!(!price.is_general());
    }

    #[test]
    fn test_price_with_missing_and_extra_fields() {
        let json = r#"{
            "type": "ActualInterval",
            "date": "2021-05-05",
            "duration": 30,
            "startTime": "2021-05-05T01:30:01Z",
            "endTime": "2021-05-05T02:00:00Z",
            "perKwh": 20.5,
            "channelType": "general",
            "descriptor": "neutral",
            "tariffInformation": { "period": "peak" }
        }"#;

        let price: Price = serde_json::from_str(json).unwrap();

        assert_eq!(price.kind, "ActualInterval");
        assert_eq!(price.per_kwh, 20.5);
        assert_eq!(price.nem_time, "");
        assert_eq!(price.renewables, 0.0);
        assert!(!price.estimate);
    }

    #[test]
    fn test_forecast_window() {
        let now = Utc.with_ymd_and_hms(2021, 5, 5, 9, 15, 0).unwrap();

        assert_eq!(
            forecast_window(now),
            ("2021-05-05".to_owned(), "2021-05-06".to_owned())
        );
    }

    #[test]
    fn test_forecast_window_across_year_end() {
        let aest = FixedOffset::east_opt(10 * 3600).unwrap();
        let now = aest.with_ymd_and_hms(2021, 12, 31, 23, 59, 0).unwrap();

        assert_eq!(
            forecast_window(now),
            ("2021-12-31".to_owned(), "2022-01-01".to_owned())
        );
    }

    #[test]
    fn test_forecast_window_across_dst_start() {
        // clocks skip 02:00 -> 03:00 on 2021-10-03 in Sydney, so 24 hours after
        // 23:30 is 00:30 two calendar days later
        let now = chrono_tz::Australia::Sydney
            .with_ymd_and_hms(2021, 10, 2, 23, 30, 0)
            .unwrap();

        assert_eq!(
            forecast_window(now),
            ("2021-10-02".to_owned(), "2021-10-04".to_owned())
        );
    }

    #[test]
    fn test_general_forecast_filters() {
        let prices = vec![
            price("ForecastInterval", "general", 0),
            price("CurrentInterval", "general", 0),
            price("ForecastInterval", "feedIn", 0),
            price("ActualInterval", "general", 0),
        ];

        let forecast = general_forecast(prices);

        assert_eq!(forecast.len(), 1);
        assert!(forecast[0].is_forecast());
        assert!(forecast[0].is_general());
    }

    #[test]
    fn test_general_forecast_sorts_stable() {
        let mut tied = price("ForecastInterval", "general", 0);
        tied.per_kwh = 99.0;
        let prices = vec![
            price("ForecastInterval", "general", 30),
            price("ForecastInterval", "general", 0),
            tied,
        ];

        let forecast = general_forecast(prices);

        let minutes = forecast
            .iter()
            .map(|price| price.start_time.format("%M").to_string())
            .collect::<Vec<_>>();
        assert_eq!(minutes, ["00", "00", "30"]);
        assert_eq!(forecast[0].per_kwh, 23.16);
        assert_eq!(forecast[1].per_kwh, 99.0);
    }

    #[test]
    fn test_general_forecast_empty() {
        let prices = vec![price("CurrentInterval", "feedIn", 0)];

        assert!(general_forecast(prices).is_empty());
    }

    #[test]
    fn test_api_error_message() {
        let err = AmberError::Api {
            status: reqwest::StatusCode::UNAUTHORIZED,
            message: "invalid token".to_owned(),
        };

        assert_eq!(err.to_string(), "invalid token");
        assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!err.is_transient());
    }
}
