//! Rolling-horizon controller for the flat capacity tariff.
//!
//! Every timestep re-plans the rest of the active sessions' windows and
//! commits only the first step of the plan. The contracted peak carried
//! between steps is a ratchet: extra peak bought in one step is paid for
//! the rest of the run.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::{ChargingSession, Entity, ScheduleAccumulator, SessionId, SessionSet, StationId};
use crate::error::{Result, SchedulingError};
use crate::optimizer::{
    ChargingStrategy, CostSummary, ModelBuilder, PolicyBreakdown, PolicyKind, PolicyVariables,
    SchedulingContext, StationOutcome, TariffPolicy,
};

/// State carried from one timestep to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingState {
    /// Energy committed so far per session (kWh).
    pub delivered: HashMap<SessionId, f64>,
    pub contracted_peak_kw: f64,
}

impl RollingState {
    pub fn new(initial_peak_kw: f64) -> Self {
        Self {
            delivered: HashMap::new(),
            contracted_peak_kw: initial_peak_kw,
        }
    }

    pub fn delivered(&self, session: &SessionId) -> f64 {
        self.delivered.get(session).copied().unwrap_or(0.0)
    }
}

/// What a single step commits.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCommit {
    pub step: usize,
    pub total_kw: f64,
    pub sessions: Vec<(SessionId, f64)>,
    pub extra_peak_kw: f64,
    pub energy_cost: f64,
}

/// Complete rolling run of one station.
#[derive(Debug, Clone)]
pub struct RollingRun {
    pub commits: Vec<StepCommit>,
    /// Contracted peak after every processed timestep.
    pub peak_trace: Vec<f64>,
    pub final_state: RollingState,
}

impl RollingRun {
    pub fn final_peak_kw(&self) -> f64 {
        self.final_state.contracted_peak_kw
    }
}

#[derive(Debug, Clone)]
pub struct RollingHorizonController {
    policy: TariffPolicy,
    capacity_tariff: f64,
    initial_peak_kw: f64,
}

impl RollingHorizonController {
    pub fn new(capacity_tariff: f64, initial_peak_kw: f64) -> Self {
        Self {
            policy: TariffPolicy::FlatCapacity {
                capacity_tariff,
                initial_peak_kw,
            },
            capacity_tariff,
            initial_peak_kw,
        }
    }

    pub fn initial_state(&self) -> RollingState {
        RollingState::new(self.initial_peak_kw)
    }

    /// Plan from grid index `step` and commit that step only.
    ///
    /// `state` is never modified; on error the caller still holds the
    /// pre-step state.
    pub async fn step(
        &self,
        state: &RollingState,
        step: usize,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<(RollingState, StepCommit)> {
        let grid = &ctx.grid;
        if step >= grid.len() {
            return Err(SchedulingError::MalformedTimeGrid(format!(
                "step {step} is outside a grid of {} timesteps",
                grid.len()
            )));
        }

        let t = grid.at(step);
        let active: Vec<&ChargingSession> = sessions.active_at(t).collect();
        let Some(last_departure) = active.iter().map(|s| s.departure).max() else {
            let commit = StepCommit {
                step,
                total_kw: 0.0,
                sessions: Vec::new(),
                extra_peak_kw: 0.0,
                energy_cost: 0.0,
            };
            return Ok((state.clone(), commit));
        };

        let horizon = grid.range(t, last_departure);
        let mut model = ModelBuilder::new(ctx, horizon.clone())
            .with_delivered(&state.delivered)
            .with_contracted_peak(state.contracted_peak_kw)
            .build(active.iter().copied())?;
        let vars = self.policy.contribute(&mut model, grid)?;
        let solved = model.solve(ctx).await?;

        let extra_peak_kw = match vars {
            PolicyVariables::ExtraPeak(extra) => solved.value(extra).max(0.0),
            _ => 0.0,
        };
        let total_kw = solved.total_power(step);
        let committed: Vec<(SessionId, f64)> = active
            .iter()
            .map(|s| (s.id.clone(), solved.session_power(&s.id, step)))
            .collect();

        let dt = grid.step_hours();
        let energy_cost = match &ctx.day_ahead {
            Some(prices) => total_kw * dt * prices.price_per_kwh(t)?,
            None => 0.0,
        };

        let mut next = state.clone();
        next.contracted_peak_kw += extra_peak_kw;
        for (id, kw) in &committed {
            *next.delivered.entry(id.clone()).or_insert(0.0) += kw * dt;
        }

        debug!(
            step,
            sessions = active.len(),
            horizon_len = horizon.len(),
            total_kw,
            extra_peak_kw,
            contracted_peak_kw = next.contracted_peak_kw,
            "rolling step committed"
        );
        Ok((
            next,
            StepCommit {
                step,
                total_kw,
                sessions: committed,
                extra_peak_kw,
                energy_cost,
            },
        ))
    }

    /// Walk the whole grid in order. Stops at the first failing step.
    pub async fn run(&self, sessions: &SessionSet, ctx: &SchedulingContext) -> Result<RollingRun> {
        let mut state = self.initial_state();
        let mut commits = Vec::with_capacity(ctx.grid.len());
        let mut peak_trace = Vec::with_capacity(ctx.grid.len());

        for step in 0..ctx.grid.len() {
            let (next, commit) = self.step(&state, step, sessions, ctx).await?;
            state = next;
            peak_trace.push(state.contracted_peak_kw);
            commits.push(commit);
        }

        Ok(RollingRun {
            commits,
            peak_trace,
            final_state: state,
        })
    }
}

#[async_trait]
impl ChargingStrategy for RollingHorizonController {
    fn name(&self) -> &'static str {
        PolicyKind::FlatCapacity.into()
    }

    async fn schedule(
        &self,
        station: &StationId,
        sessions: &SessionSet,
        ctx: &SchedulingContext,
    ) -> Result<StationOutcome> {
        let run = self.run(sessions, ctx).await?;

        let station_col = Entity::Station(station.clone());
        let mut acc = ScheduleAccumulator::new(&ctx.grid, self.name());
        acc.ensure(station_col.clone());
        if ctx.include_session_columns {
            for session in sessions {
                acc.ensure(Entity::Session(session.id.clone()));
            }
        }

        let mut energy_cost = 0.0;
        for commit in &run.commits {
            acc.record(commit.step, station_col.clone(), commit.total_kw);
            if ctx.include_session_columns {
                for (id, kw) in &commit.sessions {
                    acc.record(commit.step, Entity::Session(id.clone()), *kw);
                }
            }
            energy_cost += commit.energy_cost;
        }

        let costs = CostSummary {
            energy_cost,
            grid_cost: (run.final_peak_kw() - self.initial_peak_kw) * self.capacity_tariff / 12.0,
        };
        info!(
            station = %station,
            sessions = sessions.len(),
            initial_peak_kw = self.initial_peak_kw,
            final_peak_kw = run.final_peak_kw(),
            "rolling schedule computed"
        );
        Ok(StationOutcome {
            station: station.clone(),
            schedule: Some(acc.finish()),
            breakdown: PolicyBreakdown::PeakTrace {
                initial_peak_kw: self.initial_peak_kw,
                trace: run.peak_trace,
            },
            costs,
        })
    }
}
