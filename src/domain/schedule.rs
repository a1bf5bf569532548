use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::{SessionId, StationId, TimeGrid};

/// Values closer to zero than this are solver noise.
const NOISE_KW: f64 = 1e-9;

/// Column key of the output table, serialized as `station:<id>` or `session:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Entity {
    Station(StationId),
    Session(SessionId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Station(id) => write!(f, "station:{id}"),
            Entity::Session(id) => write!(f, "session:{id}"),
        }
    }
}

impl From<Entity> for String {
    fn from(entity: Entity) -> Self {
        entity.to_string()
    }
}

impl TryFrom<String> for Entity {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.split_once(':') {
            Some(("station", id)) => Ok(Entity::Station(StationId::from(id))),
            Some(("session", id)) => Ok(Entity::Session(SessionId::from(id))),
            _ => Err(format!("unknown column key {s:?}")),
        }
    }
}

/// Power table indexed by timestamp with one kW column per entity.
///
/// Covers exactly the input grid; every cell is present, zero included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub created_at: DateTime<FixedOffset>,
    pub policy: String,
    pub timestamps: Vec<DateTime<FixedOffset>>,
    pub columns: BTreeMap<Entity, Vec<f64>>,
}

impl Schedule {
    pub fn column(&self, entity: &Entity) -> Option<&[f64]> {
        self.columns.get(entity).map(Vec::as_slice)
    }

    pub fn station(&self, id: &StationId) -> Option<&[f64]> {
        self.column(&Entity::Station(id.clone()))
    }

    pub fn session(&self, id: &SessionId) -> Option<&[f64]> {
        self.column(&Entity::Session(id.clone()))
    }

    pub fn power_at(&self, entity: &Entity, t: DateTime<FixedOffset>) -> Option<f64> {
        let i = self.timestamps.iter().position(|ts| *ts == t)?;
        self.columns.get(entity).map(|c| c[i])
    }

    /// Peak of one column (kW).
    pub fn peak(&self, entity: &Entity) -> Option<f64> {
        self.columns
            .get(entity)
            .map(|c| c.iter().copied().fold(0.0, f64::max))
    }

    /// Energy of one column (kWh) for a step of `step_hours`.
    pub fn energy(&self, entity: &Entity, step_hours: f64) -> Option<f64> {
        self.columns
            .get(entity)
            .map(|c| c.iter().sum::<f64>() * step_hours)
    }

    /// Same table with every cell rounded to `decimals` places.
    pub fn rounded(mut self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        for column in self.columns.values_mut() {
            for v in column.iter_mut() {
                *v = (*v * factor).round() / factor;
            }
        }
        self
    }

    /// Combine station schedules computed on the same grid.
    pub fn merge(policy: impl Into<String>, grid: &TimeGrid, parts: impl IntoIterator<Item = Schedule>) -> Self {
        let mut acc = ScheduleAccumulator::new(grid, policy);
        for part in parts {
            for (entity, values) in part.columns {
                acc.columns
                    .entry(entity)
                    .and_modify(|c| c.iter_mut().zip(&values).for_each(|(a, b)| *a += b))
                    .or_insert(values);
            }
        }
        acc.finish()
    }
}

/// Collects committed power values into a [`Schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleAccumulator {
    policy: String,
    timestamps: Vec<DateTime<FixedOffset>>,
    columns: BTreeMap<Entity, Vec<f64>>,
}

impl ScheduleAccumulator {
    pub fn new(grid: &TimeGrid, policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            timestamps: grid.timestamps().to_vec(),
            columns: BTreeMap::new(),
        }
    }

    /// Make sure `entity` has a column even if nothing is recorded for it.
    pub fn ensure(&mut self, entity: Entity) {
        let len = self.timestamps.len();
        self.columns.entry(entity).or_insert_with(|| vec![0.0; len]);
    }

    /// Overwrite the value of `entity` at grid index `step`.
    pub fn record(&mut self, step: usize, entity: Entity, power_kw: f64) {
        let len = self.timestamps.len();
        let column = self.columns.entry(entity).or_insert_with(|| vec![0.0; len]);
        column[step] = clean(power_kw);
    }

    /// Add to the value of `entity` at grid index `step`.
    pub fn add(&mut self, step: usize, entity: Entity, power_kw: f64) {
        let len = self.timestamps.len();
        let column = self.columns.entry(entity).or_insert_with(|| vec![0.0; len]);
        column[step] = clean(column[step] + power_kw);
    }

    pub fn value(&self, step: usize, entity: &Entity) -> f64 {
        self.columns.get(entity).map_or(0.0, |c| c[step])
    }

    pub fn finish(self) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            created_at: Utc::now().fixed_offset(),
            policy: self.policy,
            timestamps: self.timestamps,
            columns: self.columns,
        }
    }
}

fn clean(power_kw: f64) -> f64 {
    if power_kw.abs() < NOISE_KW {
        0.0
    } else {
        power_kw
    }
}
