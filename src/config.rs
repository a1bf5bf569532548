use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{GridTariffSeries, ThresholdTable, TierRates};
use crate::optimizer::{PolicyKind, TariffPolicy, DEFAULT_TIEBREAK_SCALE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall-clock limit per solve; 0 disables it.
    pub time_limit_seconds: u64,
    /// Divisor M of the early-delivery tiebreak.
    pub tiebreak_scale: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_seconds: 60,
            tiebreak_scale: DEFAULT_TIEBREAK_SCALE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub timestep_minutes: u32,
    /// Add the day-ahead energy cost to every optimized objective.
    pub dynamic_pricing: bool,
    /// Round the printed schedule; raw values when unset.
    pub output_decimals: Option<u32>,
    pub include_session_columns: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            timestep_minutes: 15,
            dynamic_pricing: false,
            output_decimals: None,
            include_session_columns: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    pub policy: String,
    /// Annual capacity tariff (currency per kW per year).
    pub capacity_tariff: f64,
    pub initial_peak_kw: f64,
    /// Currency per kWh above the subscription.
    pub exceedance_fee: f64,
    pub subscribed_capacity_kw: f64,
    pub low_rate: f64,
    pub medium_rate: f64,
    pub high_rate: f64,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Uncontrolled.to_string(),
            capacity_tariff: 0.0,
            initial_peak_kw: 0.0,
            exceedance_fee: 0.0,
            subscribed_capacity_kw: 0.0,
            low_rate: 0.0,
            medium_rate: 0.0,
            high_rate: 0.0,
        }
    }
}

impl TariffConfig {
    pub fn kind(&self) -> Result<PolicyKind> {
        self.policy
            .parse()
            .with_context(|| format!("unknown tariff policy {:?}", self.policy))
    }

    pub fn tier_rates(&self) -> TierRates {
        TierRates {
            low: self.low_rate,
            medium: self.medium_rate,
            high: self.high_rate,
        }
    }

    /// Build the policy; the per-timestep tables come from the scenario.
    pub fn policy(
        &self,
        grid_tariff: Option<Arc<GridTariffSeries>>,
        thresholds: Option<Arc<ThresholdTable>>,
    ) -> Result<TariffPolicy> {
        Ok(match self.kind()? {
            PolicyKind::Uncontrolled => TariffPolicy::Uncontrolled,
            PolicyKind::VolumetricTou => TariffPolicy::VolumetricToU {
                grid_tariff: grid_tariff.context("volumetric_tou needs a grid tariff table")?,
            },
            PolicyKind::SegmentedVolumetricTou => TariffPolicy::SegmentedVolumetricToU {
                thresholds: thresholds.context("segmented_volumetric_tou needs a threshold table")?,
                rates: self.tier_rates(),
            },
            PolicyKind::CapacitySubscription => TariffPolicy::CapacitySubscription {
                subscribed_capacity_kw: self.subscribed_capacity_kw,
                exceedance_fee: self.exceedance_fee,
            },
            PolicyKind::MonthlyCapacityPreparation => TariffPolicy::MonthlyCapacityPreparation {
                capacity_tariff: self.capacity_tariff,
            },
            PolicyKind::FlatCapacity => TariffPolicy::FlatCapacity {
                capacity_tariff: self.capacity_tariff,
                initial_peak_kw: self.initial_peak_kw,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub scenario_path: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            scenario_path: PathBuf::from("scenario.json"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let cfg: Config = Self::figment().extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("EVTO__").split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduling.timestep_minutes == 0 {
            bail!("scheduling.timestep_minutes must be positive");
        }
        if !(self.solver.tiebreak_scale.is_finite() && self.solver.tiebreak_scale > 0.0) {
            bail!("solver.tiebreak_scale must be a positive number");
        }
        self.tariff.kind()?;

        let t = &self.tariff;
        let amounts = [
            ("capacity_tariff", t.capacity_tariff),
            ("initial_peak_kw", t.initial_peak_kw),
            ("exceedance_fee", t.exceedance_fee),
            ("subscribed_capacity_kw", t.subscribed_capacity_kw),
            ("low_rate", t.low_rate),
            ("medium_rate", t.medium_rate),
            ("high_rate", t.high_rate),
        ];
        for (name, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                bail!("tariff.{name} must be a non-negative number, got {value}");
            }
        }
        if !t.tier_rates().is_ordered() {
            warn!(
                low = t.low_rate,
                medium = t.medium_rate,
                high = t.high_rate,
                "tier rates are not ordered low <= medium <= high; tiers may fill out of order"
            );
        }
        Ok(())
    }
}
