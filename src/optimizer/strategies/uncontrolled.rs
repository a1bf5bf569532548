use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{ChargingSession, Entity, ScheduleAccumulator, SessionSet, StationId, TimeGrid};
use crate::error::Result;
use crate::optimizer::model::ENERGY_TOLERANCE_KWH;
use crate::optimizer::{ChargingStrategy, CostSummary, PolicyBreakdown, PolicyKind, SchedulingContext, StationOutcome};

/// Baseline without any control: every session charges at full power from
/// arrival until its demand is met, then stops.
///
/// A session whose window is too short ends undercharged; that is logged,
/// never an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncontrolledStrategy;

/// Power profile of one session under uncontrolled charging.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargingProfile {
    /// (grid index, kW), chronological, zeros omitted.
    pub powers: Vec<(usize, f64)>,
    /// Demand left when the session departed (kWh).
    pub shortfall_kwh: f64,
}

impl UncontrolledStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Full steps at max power, then one partial step for the remainder.
    pub fn profile(session: &ChargingSession, grid: &TimeGrid) -> ChargingProfile {
        let dt = grid.step_hours();
        let per_step_kwh = session.max_power_kw * dt;
        let mut remaining = session.demand_kwh;
        let mut powers = Vec::new();

        for step in grid.range(session.arrival, session.departure) {
            if remaining <= ENERGY_TOLERANCE_KWH {
                break;
            }
            if remaining >= per_step_kwh {
                powers.push((step, session.max_power_kw));
                remaining -= per_step_kwh;
            } else {
                powers.push((step, remaining / dt));
                remaining = 0.0;
            }
        }

        ChargingProfile {
            powers,
            shortfall_kwh: if remaining > ENERGY_TOLERANCE_KWH { remaining } else { 0.0 },
        }
    }
}

#[async_trait]
impl ChargingStrategy for UncontrolledStrategy {
    fn name(&self) -> &'static str {
        PolicyKind::Uncontrolled.into()
    }

    async fn schedule(
        &self,
        station: &StationId,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<StationOutcome> {
        let grid = &ctx.grid;
        let dt = grid.step_hours();
        let station_col = Entity::Station(station.clone());
        let mut acc = ScheduleAccumulator::new(grid, self.name());
        acc.ensure(station_col.clone());
        let mut costs = CostSummary::default();

        for session in sessions {
            let profile = Self::profile(session, grid);
            if profile.shortfall_kwh > 0.0 {
                warn!(
                    station = %station,
                    session = %session.id,
                    shortfall_kwh = profile.shortfall_kwh,
                    "session departs undercharged"
                );
            }

            let session_col = Entity::Session(session.id.clone());
            if ctx.include_session_columns {
                acc.ensure(session_col.clone());
            }
            for (step, kw) in profile.powers {
                acc.add(step, station_col.clone(), kw);
                if ctx.include_session_columns {
                    acc.record(step, session_col.clone(), kw);
                }
                if let Some(prices) = &ctx.day_ahead {
                    costs.energy_cost += kw * dt * prices.price_per_kwh(grid.at(step))?;
                }
            }
        }

        info!(station = %station, sessions = sessions.len(), "uncontrolled schedule computed");
        Ok(StationOutcome {
            station: station.clone(),
            schedule: Some(acc.finish()),
            breakdown: PolicyBreakdown::None,
            costs,
        })
    }
}
