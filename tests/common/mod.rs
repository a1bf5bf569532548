#![allow(dead_code)]

use chrono::{DateTime, Duration, FixedOffset};
use ev_tariff_optimizer::domain::{ChargingSession, SessionId, StationId, TimeGrid};
use ev_tariff_optimizer::optimizer::{GoodLpSolver, SchedulingContext};
use std::sync::Arc;

pub const START: &str = "2024-06-03T08:00:00+02:00";

pub fn ts(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

/// Timestamp `minutes` after [`START`].
pub fn at(minutes: i64) -> DateTime<FixedOffset> {
    ts(START) + Duration::minutes(minutes)
}

pub fn grid(len: usize) -> TimeGrid {
    TimeGrid::new(ts(START), Duration::minutes(15), len).unwrap()
}

pub fn ctx(len: usize) -> SchedulingContext {
    SchedulingContext::new(Arc::new(grid(len)), Arc::new(GoodLpSolver::default())).with_session_columns(true)
}

/// Session on station `cs1` between two offsets (minutes) from [`START`].
pub fn session(id: &str, from_min: i64, until_min: i64, max_power_kw: f64, demand_kwh: f64) -> ChargingSession {
    ChargingSession {
        id: SessionId::from(id),
        arrival: at(from_min),
        departure: at(until_min),
        max_power_kw,
        demand_kwh,
        station: StationId::from("cs1"),
    }
}

pub fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "{got:?} vs {want:?}");
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-6, "{got:?} vs {want:?}");
    }
}
