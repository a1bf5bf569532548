//! Solver-independent linear programs.
//!
//! A [`LinearProgram`] is plain owned data: continuous variables with
//! bounds, linear constraints and one linear objective to minimise. Handles
//! ([`VarId`]) are only meaningful for the program that issued them and are
//! never kept across solves.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above.
    pub upper: f64,
}

impl Bounds {
    pub fn non_negative() -> Self {
        Self { lower: 0.0, upper: f64::INFINITY }
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

/// `Σ coefficient · variable + constant`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(var: VarId, coefficient: f64) -> Self {
        Self {
            terms: vec![(var, coefficient)],
            constant: 0.0,
        }
    }

    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1.0)).collect(),
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient != 0.0 {
            self.terms.push((var, coefficient));
        }
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        for (_, c) in &mut self.terms {
            *c *= factor;
        }
        self.constant *= factor;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate against solved values.
    pub fn evaluate(&self, assignment: &Assignment) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * assignment.value(*v))
            .sum::<f64>()
            + self.constant
    }

    /// Smallest non-zero coefficient magnitude, if any.
    pub fn min_abs_coefficient(&self) -> Option<f64> {
        self.terms
            .iter()
            .map(|(_, c)| c.abs())
            .filter(|c| *c > 0.0)
            .reduce(f64::min)
    }
}

impl AddAssign for LinearExpr {
    fn add_assign(&mut self, rhs: Self) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl Add for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scaled(rhs)
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        Self::term(var, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// `expr (== | <= | >=) rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    variables: Vec<Bounds>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, bounds: Bounds) -> VarId {
        self.variables.push(bounds);
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(&mut self, expr: LinearExpr, relation: Relation, rhs: f64) {
        self.constraints.push(LinearConstraint { expr, relation, rhs });
    }

    /// Add `expr` to the minimisation objective.
    pub fn minimise(&mut self, expr: LinearExpr) {
        self.objective += expr;
    }

    pub fn variables(&self) -> &[Bounds] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }
}

/// Optimal values of every variable of one solved program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    values: Vec<f64>,
}

impl Assignment {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_building_and_evaluation() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::non_negative());
        let y = lp.add_variable(Bounds::between(0.0, 4.0));

        let mut expr = LinearExpr::sum([x, y]);
        expr.add_term(x, 2.0);
        expr.add_term(y, 0.0);
        let expr = expr * 0.5 + LinearExpr { terms: vec![], constant: 1.0 };

        let assignment = Assignment::new(vec![2.0, 3.0]);
        // 0.5 * (2 + 3 + 4) + 1
        assert_eq!(expr.evaluate(&assignment), 5.5);
        assert_eq!(expr.terms.len(), 3);
    }

    #[test]
    fn smallest_coefficient_ignores_zeros() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::non_negative());
        let mut expr = LinearExpr::term(x, 0.0);
        expr += LinearExpr::term(x, -1e-9);
        expr += LinearExpr::term(x, 3.0);
        assert_eq!(expr.min_abs_coefficient(), Some(1e-9));
        assert_eq!(LinearExpr::new().min_abs_coefficient(), None);
    }

    #[test]
    fn objective_accumulates() {
        let mut lp = LinearProgram::new();
        let x = lp.add_variable(Bounds::non_negative());
        lp.minimise(LinearExpr::term(x, 1.0));
        lp.minimise(LinearExpr::term(x, 2.0));
        lp.add_constraint(LinearExpr::from(x), Relation::Ge, 1.0);
        assert_eq!(lp.objective().terms.len(), 2);
        assert_eq!(lp.constraints().len(), 1);
        assert_eq!(lp.num_variables(), 1);
    }
}
