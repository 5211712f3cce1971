use std::fs;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cbs_mapf::config::{Cli, Config};
use cbs_mapf::level::Level;
use cbs_mapf::solver::{self, SolveOutcome};
use cbs_mapf::stat::Stats;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli);
    config.validate().context("invalid configuration")?;

    let level = Level::from_file(&config.level_path).context("failed to load level")?;
    info!(
        agents = level.agents.len(),
        boxes = level.boxes.len(),
        "level loaded"
    );

    let start = Instant::now();
    let outcome = solver::solve(&level, &config);
    let elapsed = start.elapsed();

    let mut stats = Stats { time_ms: elapsed.as_millis(), ..Default::default() };

    match outcome {
        SolveOutcome::Solved { plan, sum_of_costs, high_level_expansions } => {
            info!(sum_of_costs, high_level_expansions, ms = elapsed.as_millis(), "solved");
            stats.solved = true;
            stats.sum_of_costs = sum_of_costs;
            stats.high_level_expansions = high_level_expansions;

            let rendered = plan
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect::<Vec<_>>()
                .join("\n");
            fs::write(&config.solution_path, rendered).context("failed to write solution file")?;
        }
        SolveOutcome::NoSolution(reason) => {
            info!(%reason, ms = elapsed.as_millis(), "no solution");
            fs::write(&config.solution_path, format!("no solution: {reason}\n")).context("failed to write solution file")?;
        }
    }

    stats.print(&config);
    Ok(())
}
