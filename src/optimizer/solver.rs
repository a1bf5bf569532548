//! Boundary between model formulation and the LP engine.
//!
//! Everything above this module speaks [`LinearProgram`]; only
//! [`GoodLpSolver`] knows about `good_lp`.

use async_trait::async_trait;
use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::lp::{Assignment, LinearExpr, LinearProgram, Relation};
use crate::error::{Result, SchedulingError};

/// Upper limit of the objective rescaling factor.
const MAX_OBJECTIVE_SCALE: f64 = 1e12;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Solver: Send + Sync {
    /// Minimise `program` and return the optimal value of every variable.
    async fn solve(&self, program: LinearProgram) -> Result<Assignment>;
}

/// Pure-Rust simplex backend with an optional wall-clock limit per solve.
#[derive(Debug, Clone, Default)]
pub struct GoodLpSolver {
    time_limit: Option<Duration>,
}

impl GoodLpSolver {
    pub fn new(time_limit: Option<Duration>) -> Self {
        Self { time_limit }
    }

    pub fn with_time_limit_seconds(seconds: u64) -> Self {
        Self::new((seconds > 0).then(|| Duration::from_secs(seconds)))
    }

    /// Solve on the calling thread.
    pub fn solve_blocking(program: &LinearProgram) -> Result<Assignment> {
        let started = Instant::now();
        let scale = objective_scale(program.objective());

        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = program
            .variables()
            .iter()
            .map(|b| {
                let def = variable().min(b.lower);
                if b.upper.is_finite() {
                    vars.add(def.max(b.upper))
                } else {
                    vars.add(def)
                }
            })
            .collect();

        let to_expression = |expr: &LinearExpr| -> Expression {
            let mut out = Expression::default();
            out += expr.constant;
            for (var, coefficient) in &expr.terms {
                out += *coefficient * handles[var.index()];
            }
            out
        };

        let objective = to_expression(&program.objective().clone().scaled(scale));
        let mut model = vars.minimise(objective).using(microlp);
        for c in program.constraints() {
            let lhs = to_expression(&c.expr);
            model = model.with(match c.relation {
                Relation::Eq => constraint::eq(lhs, c.rhs),
                Relation::Le => constraint::leq(lhs, c.rhs),
                Relation::Ge => constraint::geq(lhs, c.rhs),
            });
        }

        let solution = model.solve().map_err(map_resolution_error)?;
        let values = handles.iter().map(|v| solution.value(*v)).collect();

        debug!(
            variables = program.num_variables(),
            constraints = program.constraints().len(),
            objective_scale = scale,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "linear program solved"
        );
        Ok(Assignment::new(values))
    }
}

#[async_trait]
impl Solver for GoodLpSolver {
    async fn solve(&self, program: LinearProgram) -> Result<Assignment> {
        let task = tokio::task::spawn_blocking(move || Self::solve_blocking(&program));
        let joined = match self.time_limit {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                warn!(limit_s = limit.as_secs(), "solver time limit exceeded");
                SchedulingError::SolverTimeout {
                    seconds: limit.as_secs(),
                }
            })?,
            None => task.await,
        };
        joined.map_err(|e| SchedulingError::SolverFailure(format!("solver task aborted: {e}")))?
    }
}

/// Positive factor bringing the smallest objective coefficient up to ~1.
///
/// Multiplying a minimisation objective by a positive constant keeps its
/// argmin, so tiny tiebreak weights survive the simplex tolerances.
fn objective_scale(objective: &LinearExpr) -> f64 {
    match objective.min_abs_coefficient() {
        Some(smallest) if smallest < 1.0 => (1.0 / smallest).min(MAX_OBJECTIVE_SCALE),
        _ => 1.0,
    }
}

fn map_resolution_error(err: ResolutionError) -> SchedulingError {
    match err {
        ResolutionError::Infeasible => {
            SchedulingError::Infeasible("solver found no schedule satisfying all constraints".into())
        }
        ResolutionError::Unbounded => SchedulingError::SolverFailure("objective is unbounded".into()),
        other => SchedulingError::SolverFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::lp::Bounds;

    #[tokio::test]
    async fn solves_a_small_program() {
        // min x + 2y  s.t. x + y == 3, x <= 2
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::between(0.0, 2.0));
        let y = lp.add_variable(Bounds::non_negative());
        lp.add_constraint(LinearExpr::sum([x, y]), Relation::Eq, 3.0);
        lp.minimise(LinearExpr::term(x, 1.0) + LinearExpr::term(y, 2.0));

        let assignment = GoodLpSolver::default().solve(lp).await.unwrap();
        assert!((assignment.value(x) - 2.0).abs() < 1e-6);
        assert!((assignment.value(y) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn infeasible_is_distinct_from_failure() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::between(0.0, 1.0));
        lp.add_constraint(LinearExpr::from(x), Relation::Ge, 2.0);
        lp.minimise(LinearExpr::term(x, 1.0));

        let err = GoodLpSolver::default().solve(lp).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Infeasible(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn tiny_objective_weights_still_break_ties() {
        // Equal cost for x and y, y carries a 1e-9 penalty.
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::between(0.0, 5.0));
        let y = lp.add_variable(Bounds::between(0.0, 5.0));
        lp.add_constraint(LinearExpr::sum([x, y]), Relation::Eq, 5.0);
        lp.minimise(LinearExpr::term(x, 1.0) + LinearExpr::term(y, 1.0));
        lp.minimise(LinearExpr::term(y, 1e-9));

        let assignment = GoodLpSolver::default().solve(lp).await.unwrap();
        assert!((assignment.value(x) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn objective_scale_only_grows_small_objectives() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::non_negative());
        assert_eq!(objective_scale(&LinearExpr::term(x, 5.0)), 1.0);
        assert_eq!(objective_scale(&LinearExpr::term(x, 0.5)), 2.0);
        assert_eq!(objective_scale(&LinearExpr::term(x, 1e-20)), MAX_OBJECTIVE_SCALE);
        assert_eq!(objective_scale(&LinearExpr::new()), 1.0);
    }
}
