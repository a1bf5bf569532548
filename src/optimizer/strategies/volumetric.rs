use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

use super::record_solution;
use crate::domain::{ChargingSession, GridTariffSeries, ScheduleAccumulator, SessionSet, StationId};
use crate::error::Result;
use crate::optimizer::model::{ModelBuilder, SolvedModel};
use crate::optimizer::{
    ChargingStrategy, CostSummary, PolicyBreakdown, SchedulingContext, StationOutcome, TariffPolicy,
};

/// Volumetric time-of-use: every session is optimized on its own against
/// the grid rate (and day-ahead price when enabled).
///
/// Nothing couples the sessions of a station, so the station total is the
/// plain sum of the per-session optima and the solves run concurrently.
#[derive(Debug, Clone)]
pub struct VolumetricStrategy {
    policy: TariffPolicy,
}

impl VolumetricStrategy {
    pub fn new(grid_tariff: Arc<GridTariffSeries>) -> Self {
        Self {
            policy: TariffPolicy::VolumetricToU { grid_tariff },
        }
    }

    async fn solve_session(&self, session: &ChargingSession, ctx: &SchedulingContext) -> Result<SolvedModel> {
        let window = ctx.grid.range(session.arrival, session.departure);
        let mut model = ModelBuilder::new(ctx, window).build([session])?;
        self.policy.contribute(&mut model, &ctx.grid)?;
        let solved = model.solve(ctx).await?;
        debug!(session = %session.id, cost = solved.costs().total(), "session optimized");
        Ok(solved)
    }
}

#[async_trait]
impl ChargingStrategy for VolumetricStrategy {
    fn name(&self) -> &'static str {
        self.policy.kind().into()
    }

    async fn schedule(
        &self,
        station: &StationId,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<StationOutcome> {
        let solved = try_join_all(sessions.iter().map(|s| self.solve_session(s, ctx))).await?;

        let mut acc = ScheduleAccumulator::new(&ctx.grid, self.name());
        let mut costs = CostSummary::default();
        for part in &solved {
            record_solution(&mut acc, part, station, sessions, ctx);
            costs += part.costs();
        }

        info!(station = %station, sessions = sessions.len(), cost = costs.total(), "volumetric schedule computed");
        Ok(StationOutcome {
            station: station.clone(),
            schedule: Some(acc.finish()),
            breakdown: PolicyBreakdown::None,
            costs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::fixtures::{session, ts};
    use crate::domain::{SessionId, TimeGrid};
    use crate::error::SchedulingError;
    use crate::optimizer::GoodLpSolver;
    use chrono::Duration;

    fn ctx() -> SchedulingContext {
        let grid = TimeGrid::new(ts("2024-01-01T08:00:00+00:00"), Duration::minutes(15), 4).unwrap();
        SchedulingContext::new(Arc::new(grid), Arc::new(GoodLpSolver::default())).with_session_columns(true)
    }

    #[tokio::test]
    async fn charges_in_the_cheapest_slots() {
        let ctx = ctx();
        let rates = [0.30, 0.10, 0.20, 0.05];
        let tariff = GridTariffSeries::new(ctx.grid.timestamps().iter().copied().zip(rates));
        let strategy = VolumetricStrategy::new(Arc::new(tariff));
        let sessions = SessionSet::new(vec![session(
            "a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 10.0, 5.0,
        )])
        .unwrap();

        let outcome = strategy.schedule(&StationId::from("cs1"), &sessions, &ctx).await.unwrap();
        let column = outcome.schedule.unwrap().session(&SessionId::from("a")).unwrap().to_vec();

        let expected = [0.0, 10.0, 0.0, 10.0];
        for (got, want) in column.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{column:?}");
        }
        // 2.5 kWh at 0.10 + 2.5 kWh at 0.05
        assert!((outcome.costs.grid_cost - 0.375).abs() < 1e-6);
        assert_eq!(strategy.name(), "volumetric_tou");
    }

    #[tokio::test]
    async fn missing_grid_rate_fails_the_station() {
        let ctx = ctx();
        let tariff = GridTariffSeries::flat(&ctx.grid.timestamps()[..2], 0.1);
        let strategy = VolumetricStrategy::new(Arc::new(tariff));
        let sessions = SessionSet::new(vec![session(
            "a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 10.0, 5.0,
        )])
        .unwrap();

        let err = strategy.schedule(&StationId::from("cs1"), &sessions, &ctx).await.unwrap_err();
        assert!(matches!(err, SchedulingError::MissingPriceData { table: "grid tariff", .. }), "got {err:?}");
    }
}
