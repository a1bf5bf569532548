//! Common charging formulation shared by every optimized tariff policy.
//!
//! For each session: one power variable per active timestep inside the
//! horizon, bounded by the session's max power, and an equality forcing the
//! delivered energy to match the remaining demand. For each horizon
//! timestep: one total-power variable equal to the sum of active session
//! powers. Tariff policies add their own variables on top (see
//! [`TariffPolicy::contribute`](super::TariffPolicy::contribute)).

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use tracing::debug;

use super::lp::{Assignment, Bounds, LinearExpr, LinearProgram, Relation, VarId};
use super::{CostSummary, SchedulingContext};
use crate::domain::{ChargingSession, SessionId};
use crate::error::{Result, SchedulingError};

/// Energy slack (kWh) tolerated when comparing demand with what was delivered.
pub const ENERGY_TOLERANCE_KWH: f64 = 1e-6;

/// Power variables of one session, in chronological order.
#[derive(Debug, Clone)]
pub struct SessionVars {
    pub session: SessionId,
    pub max_power_kw: f64,
    /// Grid index of `powers[0]`.
    pub first_step: usize,
    pub powers: Vec<VarId>,
}

impl SessionVars {
    pub fn steps(&self) -> Range<usize> {
        self.first_step..self.first_step + self.powers.len()
    }
}

pub struct ModelBuilder<'a> {
    ctx: &'a SchedulingContext,
    horizon: Range<usize>,
    delivered: Option<&'a HashMap<SessionId, f64>>,
    contracted_peak_kw: f64,
}

impl<'a> ModelBuilder<'a> {
    /// `horizon` is a range of grid indices; it is clamped to the grid.
    pub fn new(ctx: &'a SchedulingContext, horizon: Range<usize>) -> Self {
        let len = ctx.grid.len();
        let horizon = horizon.start.min(len)..horizon.end.min(len);
        Self {
            ctx,
            horizon,
            delivered: None,
            contracted_peak_kw: 0.0,
        }
    }

    /// Whole grid.
    pub fn full_horizon(ctx: &'a SchedulingContext) -> Self {
        Self::new(ctx, 0..ctx.grid.len())
    }

    /// Energy already delivered per session; reduces the demand constraint.
    pub fn with_delivered(mut self, delivered: &'a HashMap<SessionId, f64>) -> Self {
        self.delivered = Some(delivered);
        self
    }

    /// Peak already paid for, used by the flat capacity policy.
    pub fn with_contracted_peak(mut self, kw: f64) -> Self {
        self.contracted_peak_kw = kw;
        self
    }

    pub fn build<'s>(self, sessions: impl IntoIterator<Item = &'s ChargingSession>) -> Result<ChargingModel> {
        let grid = &self.ctx.grid;
        let dt = grid.step_hours();
        let mut model = ChargingModel {
            program: LinearProgram::new(),
            horizon: self.horizon.clone(),
            step_hours: dt,
            contracted_peak_kw: self.contracted_peak_kw,
            sessions: Vec::new(),
            power: BTreeMap::new(),
            totals: Vec::new(),
            energy_cost: LinearExpr::new(),
            grid_cost: LinearExpr::new(),
            priority: LinearExpr::new(),
        };

        let mut active_by_step: Vec<Vec<VarId>> = vec![Vec::new(); self.horizon.len()];

        for session in sessions {
            let delivered = self
                .delivered
                .and_then(|d| d.get(&session.id))
                .copied()
                .unwrap_or(0.0);
            let remaining = (session.demand_kwh - delivered).max(0.0);

            let window = grid.range(session.arrival, session.departure);
            let steps = window.start.max(self.horizon.start)..window.end.min(self.horizon.end);
            if steps.is_empty() {
                if remaining > ENERGY_TOLERANCE_KWH {
                    return Err(SchedulingError::ModelConstruction {
                        session: session.id.clone(),
                        remaining_kwh: remaining,
                    });
                }
                continue;
            }

            let deliverable = session.max_power_kw * dt * steps.len() as f64;
            if remaining > deliverable + ENERGY_TOLERANCE_KWH {
                return Err(SchedulingError::Infeasible(format!(
                    "session {} needs {remaining:.3} kWh but can take at most {deliverable:.3} kWh before departure",
                    session.id
                )));
            }

            let powers: Vec<VarId> = steps
                .clone()
                .map(|_| model.program.add_variable(Bounds::between(0.0, session.max_power_kw)))
                .collect();

            let mut energy = LinearExpr::new();
            for (step, var) in steps.clone().zip(&powers) {
                energy.add_term(*var, dt);
                model.power.insert((session.id.clone(), step), *var);
                active_by_step[step - self.horizon.start].push(*var);
                if let Some(prices) = &self.ctx.day_ahead {
                    let price = prices.price_per_kwh(grid.at(step))?;
                    model.energy_cost.add_term(*var, dt * price);
                }
            }
            model.program.add_constraint(energy, Relation::Eq, remaining);
            model.priority += self.ctx.tiebreak.term(&powers);

            model.sessions.push(SessionVars {
                session: session.id.clone(),
                max_power_kw: session.max_power_kw,
                first_step: steps.start,
                powers,
            });
        }

        for active in active_by_step {
            let total = model.program.add_variable(Bounds::non_negative());
            let mut balance = LinearExpr::term(total, 1.0);
            for var in active {
                balance.add_term(var, -1.0);
            }
            model.program.add_constraint(balance, Relation::Eq, 0.0);
            model.totals.push(total);
        }

        debug!(
            sessions = model.sessions.len(),
            horizon_start = self.horizon.start,
            horizon_len = self.horizon.len(),
            variables = model.program.num_variables(),
            "charging model built"
        );
        Ok(model)
    }
}

/// Variables and cost terms of one solve; discarded afterwards.
pub struct ChargingModel {
    program: LinearProgram,
    horizon: Range<usize>,
    step_hours: f64,
    contracted_peak_kw: f64,
    sessions: Vec<SessionVars>,
    /// (session, grid index) -> power variable
    power: BTreeMap<(SessionId, usize), VarId>,
    /// One per horizon step.
    totals: Vec<VarId>,
    energy_cost: LinearExpr,
    grid_cost: LinearExpr,
    priority: LinearExpr,
}

impl ChargingModel {
    pub fn horizon(&self) -> Range<usize> {
        self.horizon.clone()
    }

    pub fn step_hours(&self) -> f64 {
        self.step_hours
    }

    pub fn contracted_peak_kw(&self) -> f64 {
        self.contracted_peak_kw
    }

    pub fn sessions(&self) -> &[SessionVars] {
        &self.sessions
    }

    /// Total-power variable at grid index `step`.
    pub fn total(&self, step: usize) -> Option<VarId> {
        step.checked_sub(self.horizon.start)
            .and_then(|i| self.totals.get(i))
            .copied()
    }

    pub fn totals(&self) -> impl Iterator<Item = (usize, VarId)> + '_ {
        self.horizon.clone().zip(self.totals.iter().copied())
    }

    pub fn add_variable(&mut self, bounds: Bounds) -> VarId {
        self.program.add_variable(bounds)
    }

    pub fn add_constraint(&mut self, expr: LinearExpr, relation: Relation, rhs: f64) {
        self.program.add_constraint(expr, relation, rhs);
    }

    /// Add a tariff cost term to the objective.
    pub fn add_grid_cost(&mut self, expr: LinearExpr) {
        self.grid_cost += expr;
    }

    /// Minimise `energy + grid + priority / M`.
    pub async fn solve(mut self, ctx: &SchedulingContext) -> Result<SolvedModel> {
        let mut program = std::mem::take(&mut self.program);
        program.minimise(self.energy_cost.clone());
        program.minimise(self.grid_cost.clone());
        program.minimise(self.priority.clone());
        let assignment = ctx.solver.solve(program).await?;
        Ok(SolvedModel {
            model: self,
            assignment,
        })
    }
}

pub struct SolvedModel {
    model: ChargingModel,
    assignment: Assignment,
}

impl SolvedModel {
    pub fn model(&self) -> &ChargingModel {
        &self.model
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.assignment.value(var)
    }

    /// Power of `session` at grid index `step`; zero outside its window.
    pub fn session_power(&self, session: &SessionId, step: usize) -> f64 {
        self.model
            .power
            .get(&(session.clone(), step))
            .map_or(0.0, |v| self.assignment.value(*v))
    }

    pub fn total_power(&self, step: usize) -> f64 {
        self.model.total(step).map_or(0.0, |v| self.assignment.value(v))
    }

    pub fn costs(&self) -> CostSummary {
        CostSummary {
            energy_cost: self.model.energy_cost.evaluate(&self.assignment),
            grid_cost: self.model.grid_cost.evaluate(&self.assignment),
        }
    }

    /// Undivided priority cost of the solution.
    pub fn priority_cost(&self) -> f64 {
        self.model
            .sessions
            .iter()
            .map(|s| {
                let powers: Vec<f64> = s.powers.iter().map(|v| self.assignment.value(*v)).collect();
                super::PriorityTiebreak::raw_cost(&powers)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::fixtures::{session, ts};
    use crate::domain::{PriceSeries, TimeGrid};
    use crate::optimizer::solver::MockSolver;
    use crate::optimizer::GoodLpSolver;
    use chrono::Duration;
    use std::sync::Arc;

    fn ctx() -> SchedulingContext {
        let grid = TimeGrid::new(ts("2024-01-01T08:00:00+00:00"), Duration::minutes(15), 8).unwrap();
        SchedulingContext::new(Arc::new(grid), Arc::new(GoodLpSolver::default()))
    }

    #[test]
    fn allocates_variables_inside_the_horizon_only() {
        let ctx = ctx();
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 2.0);
        let model = ModelBuilder::new(&ctx, 2..8).build([&a]).unwrap();

        assert_eq!(model.sessions().len(), 1);
        assert_eq!(model.sessions()[0].steps(), 2..4);
        assert_eq!(model.totals().count(), 6);
        assert!(model.total(1).is_none());
        assert!(model.total(2).is_some());
    }

    #[test]
    fn empty_window_with_remaining_demand_fails() {
        let ctx = ctx();
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T08:30:00+00:00", 11.0, 2.0);
        let err = ModelBuilder::new(&ctx, 4..8).build([&a]).err().unwrap();
        assert!(matches!(err, SchedulingError::ModelConstruction { .. }), "got {err:?}");
    }

    #[test]
    fn empty_window_without_demand_is_skipped() {
        let ctx = ctx();
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T08:30:00+00:00", 11.0, 2.0);
        let delivered = HashMap::from([(SessionId::from("a"), 2.0)]);
        let model = ModelBuilder::new(&ctx, 4..8).with_delivered(&delivered).build([&a]).unwrap();
        assert!(model.sessions().is_empty());
    }

    #[test]
    fn demand_above_deliverable_energy_is_infeasible() {
        let ctx = ctx();
        // 2 steps * 0.25 h * 4 kW = 2 kWh < 3 kWh
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T08:30:00+00:00", 4.0, 3.0);
        let err = ModelBuilder::full_horizon(&ctx).build([&a]).err().unwrap();
        assert!(matches!(err, SchedulingError::Infeasible(_)), "got {err:?}");
    }

    #[test]
    fn missing_day_ahead_price_is_reported() {
        let prices = PriceSeries::new([(ts("2024-01-01T08:00:00+00:00"), 50.0)]);
        let ctx = ctx().with_day_ahead(Arc::new(prices));
        let a = session("a", "cs1", "2024-01-01T08:30:00+00:00", "2024-01-01T09:30:00+00:00", 11.0, 2.0);
        let err = ModelBuilder::full_horizon(&ctx).build([&a]).err().unwrap();
        assert!(matches!(err, SchedulingError::MissingPriceData { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn remaining_demand_is_delivered_early() {
        let ctx = ctx();
        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0);
        let delivered = HashMap::from([(SessionId::from("a"), 1.0)]);
        let solved = ModelBuilder::full_horizon(&ctx)
            .with_delivered(&delivered)
            .build([&a])
            .unwrap()
            .solve(&ctx)
            .await
            .unwrap();

        // 3 kWh left: 2.75 kWh in the first slot, 0.25 kWh in the second.
        assert!((solved.session_power(&SessionId::from("a"), 0) - 11.0).abs() < 1e-6);
        assert!((solved.session_power(&SessionId::from("a"), 1) - 1.0).abs() < 1e-6);
        assert!((solved.total_power(1) - 1.0).abs() < 1e-6);
        assert_eq!(solved.session_power(&SessionId::from("a"), 5), 0.0);
        assert!((solved.priority_cost() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn solver_errors_propagate_unchanged() {
        let mut solver = MockSolver::new();
        solver
            .expect_solve()
            .returning(|_| Err(SchedulingError::SolverFailure("numerical trouble".into())));
        let mut ctx = ctx();
        ctx.solver = Arc::new(solver);

        let a = session("a", "cs1", "2024-01-01T08:00:00+00:00", "2024-01-01T09:00:00+00:00", 11.0, 4.0);
        let model = ModelBuilder::full_horizon(&ctx).build([&a]).unwrap();
        let err = model.solve(&ctx).await.err().unwrap();
        assert!(matches!(err, SchedulingError::SolverFailure(_)));
    }
}
