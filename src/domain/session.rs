use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::error::{Result, SchedulingError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for StationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One EV plugged in at a station. Departure is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub id: SessionId,
    #[serde(alias = "Arrival time")]
    pub arrival: DateTime<FixedOffset>,
    #[serde(alias = "Departure time")]
    pub departure: DateTime<FixedOffset>,
    #[serde(alias = "Max charging power", alias = "Max. charging power (kW)")]
    pub max_power_kw: f64,
    #[serde(alias = "Charging demand", alias = "Charging demand (kWh)")]
    pub demand_kwh: f64,
    #[serde(alias = "Station id", alias = "Charging station ID")]
    pub station: StationId,
}

impl ChargingSession {
    pub fn is_active_at(&self, t: DateTime<FixedOffset>) -> bool {
        self.arrival <= t && t < self.departure
    }

    /// True when the session overlaps `[from, until)`.
    pub fn overlaps(&self, from: DateTime<FixedOffset>, until: DateTime<FixedOffset>) -> bool {
        self.arrival < until && from < self.departure
    }

    fn validate(&self) -> Result<()> {
        if self.arrival >= self.departure {
            return Err(SchedulingError::malformed(
                &self.id,
                format!("arrival {} is not before departure {}", self.arrival, self.departure),
            ));
        }
        if !self.max_power_kw.is_finite() || self.max_power_kw <= 0.0 {
            return Err(SchedulingError::malformed(
                &self.id,
                format!("max charging power must be positive, got {} kW", self.max_power_kw),
            ));
        }
        if !self.demand_kwh.is_finite() || self.demand_kwh < 0.0 {
            return Err(SchedulingError::malformed(
                &self.id,
                format!("charging demand must be non-negative, got {} kWh", self.demand_kwh),
            ));
        }
        Ok(())
    }
}

/// Validated collection of charging sessions.
///
/// Construction rejects malformed records before any model is built, so
/// everything downstream can rely on `arrival < departure`, positive max
/// power, non-negative demand and unique ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSet {
    sessions: Vec<ChargingSession>,
}

impl SessionSet {
    pub fn new(sessions: Vec<ChargingSession>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(sessions.len());
        for session in &sessions {
            session.validate()?;
            if !seen.insert(&session.id) {
                return Err(SchedulingError::malformed(&session.id, "duplicate session id"));
            }
        }
        Ok(Self { sessions })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChargingSession> {
        self.sessions.iter()
    }

    pub fn get(&self, id: &SessionId) -> Option<&ChargingSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn active_at(&self, t: DateTime<FixedOffset>) -> impl Iterator<Item = &ChargingSession> {
        self.sessions.iter().filter(move |s| s.is_active_at(t))
    }

    /// Sessions overlapping `[from, until)`.
    pub fn active_within(
        &self,
        from: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> impl Iterator<Item = &ChargingSession> {
        self.sessions.iter().filter(move |s| s.overlaps(from, until))
    }

    /// Split into one set per station; subsets of a valid set stay valid.
    pub fn by_station(&self) -> BTreeMap<StationId, SessionSet> {
        let mut stations: BTreeMap<StationId, SessionSet> = BTreeMap::new();
        for session in &self.sessions {
            stations
                .entry(session.station.clone())
                .or_default()
                .sessions
                .push(session.clone());
        }
        stations
    }
}

impl<'a> IntoIterator for &'a SessionSet {
    type Item = &'a ChargingSession;
    type IntoIter = std::slice::Iter<'a, ChargingSession>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    pub fn session(id: &str, station: &str, arrival: &str, departure: &str, max_power_kw: f64, demand_kwh: f64) -> ChargingSession {
        ChargingSession {
            id: SessionId::from(id),
            arrival: ts(arrival),
            departure: ts(departure),
            max_power_kw,
            demand_kwh,
            station: StationId::from(station),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{session, ts};
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::arrival_after_departure("2024-01-01T09:00:00+00:00", "2024-01-01T08:00:00+00:00", 11.0, 4.0)]
    #[case::zero_duration("2024-01-01T08:00:00+00:00", "2024-01-01T08:00:00+00:00", 11.0, 4.0)]
    #[case::zero_power("2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 0.0, 4.0)]
    #[case::negative_demand("2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, -1.0)]
    #[case::nan_demand("2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, f64::NAN)]
    fn malformed_sessions_are_rejected(
        #[case] arrival: &str,
        #[case] departure: &str,
        #[case] max_power_kw: f64,
        #[case] demand_kwh: f64,
    ) {
        let err = SessionSet::new(vec![session("a", "cs1", arrival, departure, max_power_kw, demand_kwh)])
            .unwrap_err();
        assert!(matches!(err, SchedulingError::MalformedSession { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0);
        let err = SessionSet::new(vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn zero_demand_is_valid() {
        let set = SessionSet::new(vec![session(
            "a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 0.0,
        )])
        .unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn activity_queries_use_exclusive_departure() {
        let set = SessionSet::new(vec![
            session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0),
            session("b", "cs1", "2024-01-01T08:30:00+00:00", "2024-01-01T10:00:00+00:00", 7.0, 5.0),
        ])
        .unwrap();

        let at = |t: &str| set.active_at(ts(t)).map(|s| s.id.0.clone()).collect::<Vec<_>>();
        assert_eq!(at("2024-01-01T08:00:00+00:00"), vec!["a"]);
        assert_eq!(at("2024-01-01T08:45:00+00:00"), vec!["a", "b"]);
        assert_eq!(at("2024-01-01T09:00:00+00:00"), vec!["b"]);

        let within = set
            .active_within(ts("2024-01-01T09:00:00+00:00"), ts("2024-01-01T09:15:00+00:00"))
            .count();
        assert_eq!(within, 1);
    }

    #[test]
    fn split_by_station() {
        let set = SessionSet::new(vec![
            session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0),
            session("b", "cs2", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0),
            session("c", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0),
        ])
        .unwrap();
        let stations = set.by_station();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[&StationId::from("cs1")].len(), 2);
        assert_eq!(stations[&StationId::from("cs2")].len(), 1);
    }

    #[test]
    fn deserializes_source_column_names() {
        let json = r#"{
            "id": "s1",
            "Arrival time": "2024-01-01T08:00:00+01:00",
            "Departure time": "2024-01-01T09:00:00+01:00",
            "Max charging power": 11.0,
            "Charging demand": 4.0,
            "Station id": "cs1"
        }"#;
        let s: ChargingSession = serde_json::from_str(json).unwrap();
        assert_eq!(s.station, StationId::from("cs1"));
        assert_eq!(s.demand_kwh, 4.0);
    }
}
