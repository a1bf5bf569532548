use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SchedulingError};

/// Hourly day-ahead prices in currency/MWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSeries {
    prices: BTreeMap<DateTime<FixedOffset>, f64>,
}

impl PriceSeries {
    pub fn new(prices: impl IntoIterator<Item = (DateTime<FixedOffset>, f64)>) -> Self {
        Self {
            prices: prices.into_iter().collect(),
        }
    }

    /// Price per MWh for the hour containing `t`.
    pub fn price_per_mwh(&self, t: DateTime<FixedOffset>) -> Result<f64> {
        let hour = truncate_to_hour(t);
        self.prices
            .get(&hour)
            .copied()
            .ok_or(SchedulingError::MissingPriceData {
                table: "day-ahead price",
                timestamp: hour,
            })
    }

    /// Price per kWh for the hour containing `t`.
    pub fn price_per_kwh(&self, t: DateTime<FixedOffset>) -> Result<f64> {
        Ok(self.price_per_mwh(t)? / 1000.0)
    }
}

/// Per-timestep volumetric grid tariff in currency/kWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridTariffSeries {
    rates: BTreeMap<DateTime<FixedOffset>, f64>,
}

impl GridTariffSeries {
    pub fn new(rates: impl IntoIterator<Item = (DateTime<FixedOffset>, f64)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
        }
    }

    /// Same rate at every listed timestamp.
    pub fn flat(timestamps: &[DateTime<FixedOffset>], rate: f64) -> Self {
        Self::new(timestamps.iter().map(|t| (*t, rate)))
    }

    pub fn rate(&self, t: DateTime<FixedOffset>) -> Result<f64> {
        self.rates
            .get(&t)
            .copied()
            .ok_or(SchedulingError::MissingPriceData {
                table: "grid tariff",
                timestamp: t,
            })
    }
}

/// Upper bounds of the two cheaper consumption tiers at one timestep (kW).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(alias = "Threshold_1")]
    pub threshold_1: f64,
    #[serde(alias = "Threshold_2")]
    pub threshold_2: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    thresholds: BTreeMap<DateTime<FixedOffset>, TierThresholds>,
}

impl ThresholdTable {
    pub fn new(thresholds: impl IntoIterator<Item = (DateTime<FixedOffset>, TierThresholds)>) -> Self {
        Self {
            thresholds: thresholds.into_iter().collect(),
        }
    }

    pub fn at(&self, t: DateTime<FixedOffset>) -> Result<TierThresholds> {
        self.thresholds
            .get(&t)
            .copied()
            .ok_or(SchedulingError::MissingPriceData {
                table: "tier threshold",
                timestamp: t,
            })
    }
}

/// Volumetric rates (currency/kWh) of the three consumption tiers.
///
/// The model only fills the cheaper tiers first when `low <= medium <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRates {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl TierRates {
    pub fn is_ordered(&self) -> bool {
        self.low <= self.medium && self.medium <= self.high
    }
}

pub(crate) fn truncate_to_hour(t: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    t.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_minute(0))
        .unwrap_or(t)
}
