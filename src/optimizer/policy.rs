use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString, IntoStaticStr};

use super::lp::{Bounds, LinearExpr, Relation, VarId};
use super::model::{ChargingModel, SolvedModel};
use crate::domain::{GridTariffSeries, ThresholdTable, TierRates, TimeGrid};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyKind {
    Uncontrolled,
    VolumetricTou,
    SegmentedVolumetricTou,
    CapacitySubscription,
    MonthlyCapacityPreparation,
    FlatCapacity,
}

/// Tariff design a station is scheduled under.
#[derive(Debug, Clone)]
pub enum TariffPolicy {
    /// Charge at full power from arrival; no optimization.
    Uncontrolled,
    /// Per-timestep grid rate (currency/kWh), one solve per session.
    VolumetricToU { grid_tariff: Arc<GridTariffSeries> },
    /// Three consumption tiers per timestep with increasing rates.
    SegmentedVolumetricToU {
        thresholds: Arc<ThresholdTable>,
        rates: TierRates,
    },
    /// Power above the subscription pays `exceedance_fee` per kWh.
    CapacitySubscription {
        subscribed_capacity_kw: f64,
        exceedance_fee: f64,
    },
    /// Offline full-horizon solve of one peak per calendar month.
    MonthlyCapacityPreparation { capacity_tariff: f64 },
    /// Rolling re-optimization; exceeding the contracted peak buys extra peak.
    FlatCapacity {
        capacity_tariff: f64,
        initial_peak_kw: f64,
    },
}

impl TariffPolicy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            TariffPolicy::Uncontrolled => PolicyKind::Uncontrolled,
            TariffPolicy::VolumetricToU { .. } => PolicyKind::VolumetricTou,
            TariffPolicy::SegmentedVolumetricToU { .. } => PolicyKind::SegmentedVolumetricTou,
            TariffPolicy::CapacitySubscription { .. } => PolicyKind::CapacitySubscription,
            TariffPolicy::MonthlyCapacityPreparation { .. } => PolicyKind::MonthlyCapacityPreparation,
            TariffPolicy::FlatCapacity { .. } => PolicyKind::FlatCapacity,
        }
    }

    /// Add this tariff's variables, constraints and cost term to `model`.
    pub fn contribute(&self, model: &mut ChargingModel, grid: &TimeGrid) -> Result<PolicyVariables> {
        let dt = model.step_hours();
        let totals: Vec<(usize, VarId)> = model.totals().collect();

        match self {
            TariffPolicy::Uncontrolled => Ok(PolicyVariables::None),

            TariffPolicy::VolumetricToU { grid_tariff } => {
                let mut cost = LinearExpr::new();
                for (step, total) in &totals {
                    cost.add_term(*total, dt * grid_tariff.rate(grid.at(*step))?);
                }
                model.add_grid_cost(cost);
                Ok(PolicyVariables::None)
            }

            TariffPolicy::SegmentedVolumetricToU { thresholds, rates } => {
                let (mut tier1, mut tier2, mut tier3) = (Vec::new(), Vec::new(), Vec::new());
                let mut cost = LinearExpr::new();
                for (step, total) in &totals {
                    let limits = thresholds.at(grid.at(*step))?;
                    let t1 = model.add_variable(Bounds::between(0.0, limits.threshold_1));
                    let t2 = model.add_variable(Bounds::between(0.0, limits.threshold_2));
                    let t3 = model.add_variable(Bounds::non_negative());

                    let mut split = LinearExpr::term(*total, 1.0);
                    split.add_term(t1, -1.0);
                    split.add_term(t2, -1.0);
                    split.add_term(t3, -1.0);
                    model.add_constraint(split, Relation::Eq, 0.0);

                    cost.add_term(t1, rates.low * dt);
                    cost.add_term(t2, rates.medium * dt);
                    cost.add_term(t3, rates.high * dt);
                    tier1.push(t1);
                    tier2.push(t2);
                    tier3.push(t3);
                }
                model.add_grid_cost(cost);
                Ok(PolicyVariables::Tiers { tier1, tier2, tier3 })
            }

            TariffPolicy::CapacitySubscription {
                subscribed_capacity_kw,
                exceedance_fee,
            } => {
                let (mut subscribed, mut exceedance) = (Vec::new(), Vec::new());
                let mut cost = LinearExpr::new();
                for (_, total) in &totals {
                    let within = model.add_variable(Bounds::between(0.0, *subscribed_capacity_kw));
                    let above = model.add_variable(Bounds::non_negative());

                    let mut split = LinearExpr::term(*total, 1.0);
                    split.add_term(within, -1.0);
                    split.add_term(above, -1.0);
                    model.add_constraint(split, Relation::Eq, 0.0);

                    cost.add_term(above, exceedance_fee * dt);
                    subscribed.push(within);
                    exceedance.push(above);
                }
                model.add_grid_cost(cost);
                Ok(PolicyVariables::Subscription {
                    subscribed,
                    exceedance,
                })
            }

            TariffPolicy::MonthlyCapacityPreparation { capacity_tariff } => {
                let peaks: [VarId; 12] =
                    std::array::from_fn(|_| model.add_variable(Bounds::non_negative()));
                for (step, total) in &totals {
                    let month = grid.at(*step).month0() as usize;
                    let mut below_peak = LinearExpr::term(*total, 1.0);
                    below_peak.add_term(peaks[month], -1.0);
                    model.add_constraint(below_peak, Relation::Le, 0.0);
                }
                let mut cost = LinearExpr::new();
                for peak in peaks {
                    cost.add_term(peak, capacity_tariff / 12.0);
                }
                model.add_grid_cost(cost);
                Ok(PolicyVariables::MonthlyPeaks(peaks))
            }

            TariffPolicy::FlatCapacity {
                capacity_tariff, ..
            } => {
                let contracted = model.contracted_peak_kw();
                let extra = model.add_variable(Bounds::non_negative());
                for (_, total) in &totals {
                    let mut headroom = LinearExpr::term(*total, 1.0);
                    headroom.add_term(extra, -1.0);
                    model.add_constraint(headroom, Relation::Le, contracted);
                }
                model.add_grid_cost(LinearExpr::term(extra, capacity_tariff / 12.0));
                Ok(PolicyVariables::ExtraPeak(extra))
            }
        }
    }
}

/// Handles of the variables a policy added to one model.
#[derive(Debug, Clone)]
pub enum PolicyVariables {
    None,
    Tiers {
        tier1: Vec<VarId>,
        tier2: Vec<VarId>,
        tier3: Vec<VarId>,
    },
    Subscription {
        subscribed: Vec<VarId>,
        exceedance: Vec<VarId>,
    },
    MonthlyPeaks([VarId; 12]),
    ExtraPeak(VarId),
}

impl PolicyVariables {
    pub fn breakdown(&self, solved: &SolvedModel) -> PolicyBreakdown {
        let values = |vars: &[VarId]| -> Vec<f64> { vars.iter().map(|v| solved.value(*v)).collect() };
        match self {
            PolicyVariables::None => PolicyBreakdown::None,
            PolicyVariables::Tiers { tier1, tier2, tier3 } => PolicyBreakdown::Tiers {
                tier1: values(tier1),
                tier2: values(tier2),
                tier3: values(tier3),
            },
            PolicyVariables::Subscription {
                subscribed,
                exceedance,
            } => PolicyBreakdown::Subscription {
                subscribed: values(subscribed),
                exceedance: values(exceedance),
            },
            PolicyVariables::MonthlyPeaks(peaks) => {
                PolicyBreakdown::MonthlyPeaks(MonthlyPeaks(peaks.map(|v| solved.value(v))))
            }
            PolicyVariables::ExtraPeak(extra) => PolicyBreakdown::ExtraPeak {
                extra_peak_kw: solved.value(*extra),
            },
        }
    }
}

/// Solved values of the policy-specific variables, one entry per horizon step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyBreakdown {
    None,
    Tiers {
        tier1: Vec<f64>,
        tier2: Vec<f64>,
        tier3: Vec<f64>,
    },
    Subscription {
        subscribed: Vec<f64>,
        exceedance: Vec<f64>,
    },
    MonthlyPeaks(MonthlyPeaks),
    ExtraPeak {
        extra_peak_kw: f64,
    },
    /// Contracted peak after every processed timestep of a rolling run.
    PeakTrace {
        initial_peak_kw: f64,
        trace: Vec<f64>,
    },
}

/// Optimal peak (kW) per calendar month, January first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPeaks(pub [f64; 12]);

impl MonthlyPeaks {
    /// Peak of `month` (1-12).
    pub fn get(&self, month: u32) -> Option<f64> {
        month
            .checked_sub(1)
            .and_then(|i| self.0.get(i as usize))
            .copied()
    }

    /// Largest monthly peak, the natural starting point of a flat capacity run.
    pub fn initial_peak(&self) -> f64 {
        self.0.iter().copied().fold(0.0, f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().enumerate().map(|(i, p)| (i as u32 + 1, *p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kinds_parse_from_config_strings() {
        assert_eq!(PolicyKind::from_str("flat_capacity").unwrap(), PolicyKind::FlatCapacity);
        assert_eq!(
            PolicyKind::from_str("segmented_volumetric_tou").unwrap(),
            PolicyKind::SegmentedVolumetricTou
        );
        assert_eq!(PolicyKind::CapacitySubscription.to_string(), "capacity_subscription");
        assert!(PolicyKind::from_str("real_time").is_err());
    }

    #[test]
    fn monthly_peaks_lookup() {
        let mut values = [0.0; 12];
        values[0] = 7.0;
        values[6] = 22.0;
        let peaks = MonthlyPeaks(values);
        assert_eq!(peaks.get(1), Some(7.0));
        assert_eq!(peaks.get(7), Some(22.0));
        assert_eq!(peaks.get(0), None);
        assert_eq!(peaks.get(13), None);
        assert_eq!(peaks.initial_peak(), 22.0);
        assert_eq!(peaks.iter().count(), 12);
    }

    #[test]
    fn policy_reports_its_kind() {
        let policy = TariffPolicy::FlatCapacity {
            capacity_tariff: 40.0,
            initial_peak_kw: 5.0,
        };
        assert_eq!(policy.kind(), PolicyKind::FlatCapacity);
        assert_eq!(TariffPolicy::Uncontrolled.kind().to_string(), "uncontrolled");
    }
}
