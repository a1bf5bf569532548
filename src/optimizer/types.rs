use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{PolicyBreakdown, PriorityTiebreak, Solver};
use crate::domain::{PriceSeries, Schedule, SessionSet, StationId, TimeGrid};
use crate::error::Result;

/// Read-only inputs shared by every solve of a run.
#[derive(Clone)]
pub struct SchedulingContext {
    pub grid: Arc<TimeGrid>,
    /// Day-ahead prices; `Some` enables the energy cost term.
    pub day_ahead: Option<Arc<PriceSeries>>,
    pub tiebreak: PriorityTiebreak,
    pub solver: Arc<dyn Solver>,
    /// Emit one column per session next to the station total.
    pub include_session_columns: bool,
}

impl SchedulingContext {
    pub fn new(grid: Arc<TimeGrid>, solver: Arc<dyn Solver>) -> Self {
        Self {
            grid,
            day_ahead: None,
            tiebreak: PriorityTiebreak::default(),
            solver,
            include_session_columns: false,
        }
    }

    pub fn with_day_ahead(mut self, prices: Arc<PriceSeries>) -> Self {
        self.day_ahead = Some(prices);
        self
    }

    pub fn with_tiebreak(mut self, tiebreak: PriorityTiebreak) -> Self {
        self.tiebreak = tiebreak;
        self
    }

    pub fn with_session_columns(mut self, include: bool) -> Self {
        self.include_session_columns = include;
        self
    }
}

/// Economic cost of a schedule, excluding the priority term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    /// Day-ahead energy cost.
    pub energy_cost: f64,
    /// Tariff-specific grid cost (volumetric, exceedance or capacity).
    pub grid_cost: f64,
}

impl CostSummary {
    pub fn total(&self) -> f64 {
        self.energy_cost + self.grid_cost
    }
}

impl std::ops::AddAssign for CostSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.energy_cost += rhs.energy_cost;
        self.grid_cost += rhs.grid_cost;
    }
}

/// Result of scheduling one station under one policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationOutcome {
    pub station: StationId,
    /// `None` for policies whose output is not a power series.
    pub schedule: Option<Schedule>,
    pub breakdown: PolicyBreakdown,
    pub costs: CostSummary,
}

#[async_trait]
pub trait ChargingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn schedule(
        &self,
        station: &StationId,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<StationOutcome>;
}
