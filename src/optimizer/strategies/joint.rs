use async_trait::async_trait;
use tracing::info;

use super::record_solution;
use crate::domain::{ScheduleAccumulator, SessionSet, StationId};
use crate::error::Result;
use crate::optimizer::model::ModelBuilder;
use crate::optimizer::{ChargingStrategy, PolicyKind, SchedulingContext, StationOutcome, TariffPolicy};

/// One solve over the whole grid for all sessions of a station.
///
/// Used by the tariffs whose cost couples sessions through the station
/// total: segmented volumetric, capacity subscription and monthly capacity
/// preparation. The latter produces monthly peaks instead of a schedule.
#[derive(Debug, Clone)]
pub struct JointStrategy {
    policy: TariffPolicy,
}

impl JointStrategy {
    pub fn new(policy: TariffPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TariffPolicy {
        &self.policy
    }
}

#[async_trait]
impl ChargingStrategy for JointStrategy {
    fn name(&self) -> &'static str {
        self.policy.kind().into()
    }

    async fn schedule(
        &self,
        station: &StationId,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<StationOutcome> {
        let mut model = ModelBuilder::full_horizon(ctx).build(sessions)?;
        let vars = self.policy.contribute(&mut model, &ctx.grid)?;
        let solved = model.solve(ctx).await?;

        let breakdown = vars.breakdown(&solved);
        let costs = solved.costs();
        let schedule = match self.policy.kind() {
            PolicyKind::MonthlyCapacityPreparation => None,
            _ => {
                let mut acc = ScheduleAccumulator::new(&ctx.grid, self.name());
                record_solution(&mut acc, &solved, station, sessions, ctx);
                Some(acc.finish())
            }
        };

        info!(
            station = %station,
            policy = self.name(),
            sessions = sessions.len(),
            energy_cost = costs.energy_cost,
            grid_cost = costs.grid_cost,
            "joint schedule computed"
        );
        Ok(StationOutcome {
            station: station.clone(),
            schedule,
            breakdown,
            costs,
        })
    }
}
