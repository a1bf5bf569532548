//! JSON scenario files read by the binary.

use anyhow::{Context, Result};
use chrono::Duration;
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::controller::{ScheduleReport, StationScheduler};
use crate::domain::tariff::truncate_to_hour;
use crate::domain::{ChargingSession, GridTariffSeries, PriceSeries, SessionSet, ThresholdTable, TimeGrid};
use crate::optimizer::{GoodLpSolver, PriorityTiebreak, SchedulingContext};

/// Inputs of one run.
///
/// `grid` defaults to the hours spanned by the sessions at the configured
/// timestep. The tables are only needed by the policies that read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub grid: Option<TimeGrid>,
    pub sessions: Vec<ChargingSession>,
    #[serde(default)]
    pub day_ahead_prices: Option<PriceSeries>,
    #[serde(default)]
    pub grid_tariff: Option<GridTariffSeries>,
    #[serde(default)]
    pub thresholds: Option<ThresholdTable>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn time_grid(&self, timestep_minutes: u32) -> Result<TimeGrid> {
        if let Some(grid) = &self.grid {
            return Ok(grid.clone());
        }
        let step = Duration::minutes(i64::from(timestep_minutes));
        let (first, last) = match self.sessions.iter().flat_map(|s| [s.arrival, s.departure]).minmax() {
            MinMaxResult::NoElements => anyhow::bail!("scenario has neither a grid nor sessions"),
            MinMaxResult::OneElement(t) => (t, t),
            MinMaxResult::MinMax(first, last) => (first, last),
        };
        let start = truncate_to_hour(first);
        let span = (last - start).num_minutes();
        let len = (span + step.num_minutes() - 1) / step.num_minutes();
        Ok(TimeGrid::new(start, step, len.max(1) as usize)?)
    }

    /// Validate the inputs and schedule every station under the configured policy.
    pub async fn run(self, cfg: &Config) -> Result<ScheduleReport> {
        let grid = self.time_grid(cfg.scheduling.timestep_minutes)?;
        let sessions = SessionSet::new(self.sessions).context("invalid session table")?;
        let policy = cfg
            .tariff
            .policy(self.grid_tariff.map(Arc::new), self.thresholds.map(Arc::new))?;

        let solver = GoodLpSolver::with_time_limit_seconds(cfg.solver.time_limit_seconds);
        let mut ctx = SchedulingContext::new(Arc::new(grid), Arc::new(solver))
            .with_tiebreak(PriorityTiebreak::new(cfg.solver.tiebreak_scale))
            .with_session_columns(cfg.scheduling.include_session_columns);
        if cfg.scheduling.dynamic_pricing {
            let prices = self
                .day_ahead_prices
                .context("dynamic pricing is enabled but the scenario has no day-ahead prices")?;
            ctx = ctx.with_day_ahead(Arc::new(prices));
        }

        info!(
            policy = %policy.kind(),
            sessions = sessions.len(),
            timesteps = ctx.grid.len(),
            "scheduling scenario"
        );
        let report = StationScheduler::for_policy(policy).run(&sessions, &ctx).await?;
        Ok(match cfg.scheduling.output_decimals {
            Some(decimals) => report.rounded(decimals),
            None => report,
        })
    }
}
