use anyhow::{Context, Result};
use ev_tariff_optimizer::{config, scenario, telemetry};
use config::Config;
use scenario::Scenario;
use telemetry::init_tracing;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load().context("failed to load configuration")?;
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.input.scenario_path.clone());

    info!(scenario = %path.display(), policy = %cfg.tariff.policy, "starting ev-tariff-optimizer");
    let report = Scenario::load(&path)?.run(&cfg).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(stations = report.stations.len(), total_cost = report.costs.total(), "done");
    Ok(())
}
