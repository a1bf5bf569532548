use serde::{Deserialize, Serialize};

use super::lp::{LinearExpr, VarId};

/// Default divisor M of the priority term.
pub const DEFAULT_TIEBREAK_SCALE: f64 = 1e9;

/// Auxiliary objective term preferring early delivery among equal-cost
/// schedules.
///
/// A session's power at the i-th timestep of its own active window is
/// weighted by `i / M`. The term only picks between schedules with equal
/// economic cost as long as M exceeds the ratio between the largest
/// possible priority magnitude and the smallest cost difference; nothing
/// here enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityTiebreak {
    scale: f64,
}

impl Default for PriorityTiebreak {
    fn default() -> Self {
        Self {
            scale: DEFAULT_TIEBREAK_SCALE,
        }
    }
}

impl PriorityTiebreak {
    /// `scale` must be positive and finite; anything else falls back to the default.
    pub fn new(scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            Self { scale }
        } else {
            Self::default()
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Priority term of one session, already divided by M.
    ///
    /// `powers` are the session's power variables in chronological order,
    /// starting at the first timestep of the window being optimized.
    pub fn term(&self, powers: &[VarId]) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for (position, var) in powers.iter().enumerate() {
            expr.add_term(*var, position as f64 / self.scale);
        }
        expr
    }

    /// Undivided priority cost `Σ power[i] · i` of solved powers.
    pub fn raw_cost(powers: &[f64]) -> f64 {
        powers
            .iter()
            .enumerate()
            .map(|(i, p)| p * i as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::lp::{Assignment, Bounds, LinearProgram};

    #[test]
    fn weights_grow_with_position() {
        let mut lp = LinearProgram::new();
        let vars: Vec<_> = (0..4).map(|_| lp.add_variable(Bounds::non_negative())).collect();
        let term = PriorityTiebreak::new(10.0).term(&vars);

        // Position zero carries no weight and is omitted.
        assert_eq!(term.terms, vec![(vars[1], 0.1), (vars[2], 0.2), (vars[3], 0.3)]);

        let assignment = Assignment::new(vec![11.0, 5.0, 0.0, 0.0]);
        assert!((term.evaluate(&assignment) - 0.5).abs() < 1e-12);
        assert_eq!(PriorityTiebreak::raw_cost(&[11.0, 5.0, 0.0, 0.0]), 5.0);
    }

    #[test]
    fn invalid_scale_falls_back_to_default() {
        assert_eq!(PriorityTiebreak::new(0.0).scale(), DEFAULT_TIEBREAK_SCALE);
        assert_eq!(PriorityTiebreak::new(-3.0).scale(), DEFAULT_TIEBREAK_SCALE);
        assert_eq!(PriorityTiebreak::new(f64::NAN).scale(), DEFAULT_TIEBREAK_SCALE);
        assert_eq!(PriorityTiebreak::new(1e3).scale(), 1e3);
    }
}
