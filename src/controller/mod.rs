pub mod rolling;

pub use rolling::{RollingHorizonController, RollingRun, RollingState, StepCommit};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::{Schedule, SessionSet};
use crate::error::{Result, SchedulingError};
use crate::optimizer::{
    ChargingStrategy, CostSummary, JointStrategy, SchedulingContext, StationOutcome, TariffPolicy,
    UncontrolledStrategy, VolumetricStrategy,
};

/// Strategy implementing `policy`.
pub fn strategy_for(policy: TariffPolicy) -> Arc<dyn ChargingStrategy> {
    match policy {
        TariffPolicy::Uncontrolled => Arc::new(UncontrolledStrategy::new()),
        TariffPolicy::VolumetricToU { grid_tariff } => Arc::new(VolumetricStrategy::new(grid_tariff)),
        TariffPolicy::FlatCapacity {
            capacity_tariff,
            initial_peak_kw,
        } => Arc::new(RollingHorizonController::new(capacity_tariff, initial_peak_kw)),
        joint @ (TariffPolicy::SegmentedVolumetricToU { .. }
        | TariffPolicy::CapacitySubscription { .. }
        | TariffPolicy::MonthlyCapacityPreparation { .. }) => Arc::new(JointStrategy::new(joint)),
    }
}

/// All stations of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub policy: String,
    /// Station columns (and session columns when requested) of every station.
    pub schedule: Option<Schedule>,
    /// Ordered by station id.
    pub stations: Vec<StationOutcome>,
    pub costs: CostSummary,
}

impl ScheduleReport {
    pub fn rounded(mut self, decimals: u32) -> Self {
        self.schedule = self.schedule.map(|s| s.rounded(decimals));
        self
    }
}

/// Runs one strategy for every station in parallel.
///
/// Stations share no mutable state; each task owns its own session subset
/// and, for the rolling strategy, its own [`RollingState`].
#[derive(Clone)]
pub struct StationScheduler {
    strategy: Arc<dyn ChargingStrategy>,
}

impl StationScheduler {
    pub fn new(strategy: Arc<dyn ChargingStrategy>) -> Self {
        Self { strategy }
    }

    pub fn for_policy(policy: TariffPolicy) -> Self {
        Self::new(strategy_for(policy))
    }

    pub fn policy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Schedule every station. The first failing station aborts the rest.
    pub async fn run(&self, sessions: &SessionSet, ctx: &SchedulingContext) -> Result<ScheduleReport> {
        let mut tasks = JoinSet::new();
        for (station, subset) in sessions.by_station() {
            let strategy = Arc::clone(&self.strategy);
            let ctx = ctx.clone();
            tasks.spawn(async move { strategy.schedule(&station, &subset, &ctx).await });
        }

        let mut stations = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| SchedulingError::TaskFailed(e.to_string()))?;
            match outcome {
                Ok(outcome) => stations.push(outcome),
                Err(err) => {
                    warn!(policy = self.policy_name(), error = %err, "station scheduling failed");
                    return Err(err);
                }
            }
        }
        stations.sort_by(|a, b| a.station.cmp(&b.station));

        let mut costs = CostSummary::default();
        for outcome in &stations {
            costs += outcome.costs;
        }
        let parts: Vec<Schedule> = stations.iter().filter_map(|o| o.schedule.clone()).collect();
        let schedule = (!parts.is_empty()).then(|| Schedule::merge(self.policy_name(), &ctx.grid, parts));

        info!(
            policy = self.policy_name(),
            stations = stations.len(),
            sessions = sessions.len(),
            total_cost = costs.total(),
            "all stations scheduled"
        );
        Ok(ScheduleReport {
            policy: self.policy_name().to_string(),
            schedule,
            stations,
            costs,
        })
    }
}
