use anyhow::anyhow;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cbs-mapf",
    about = "Box-warehouse multi-agent path finding via Conflict-Based Search.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to the level file (#domain/#colors/#initial/#goal format)")]
    pub level_path: String,

    #[arg(long, help = "Path to write the joint action plan")]
    pub solution_path: String,

    #[arg(long, help = "Path to append a run-stats CSV line to")]
    pub output_path: Option<String>,

    #[arg(long, help = "Max high-level (CT) expansions", default_value_t = 100_000)]
    pub expansion_budget: usize,

    #[arg(long, help = "Max time steps a single-agent path may span", default_value_t = 512)]
    pub time_horizon: usize,

    #[arg(long, help = "Max low-level (A*) expansions per replan", default_value_t = 50_000)]
    pub low_level_node_budget: usize,

    #[arg(long, help = "Wall-clock timeout in seconds", default_value_t = 60)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub level_path: String,
    pub solution_path: String,
    pub output_path: Option<String>,
    pub expansion_budget: usize,
    pub time_horizon: usize,
    pub low_level_node_budget: usize,
    pub timeout_secs: u64,
}

impl Config {
    pub fn new(cli: &Cli) -> Self {
        Self {
            level_path: cli.level_path.clone(),
            solution_path: cli.solution_path.clone(),
            output_path: cli.output_path.clone(),
            expansion_budget: cli.expansion_budget,
            time_horizon: cli.time_horizon,
            low_level_node_budget: cli.low_level_node_budget,
            timeout_secs: cli.timeout_secs,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.expansion_budget == 0 {
            return Err(anyhow!("expansion-budget must be greater than 0"));
        }
        if self.low_level_node_budget == 0 {
            return Err(anyhow!("low-level-node-budget must be greater than 0"));
        }
        if self.time_horizon == 0 {
            return Err(anyhow!("time-horizon must be greater than 0"));
        }
        Ok(())
    }
}
