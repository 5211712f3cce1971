use std::fs::OpenOptions;
use std::io::Write;

use tracing::error;

use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub sum_of_costs: usize,
    pub time_ms: u128,
    pub high_level_expansions: usize,
    pub solved: bool,
}

impl Stats {
    pub fn print(&self, config: &Config) {
        let Some(output_path) = &config.output_path else {
            return;
        };

        let mut file = match OpenOptions::new().create(true).append(true).open(output_path) {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open stats file '{output_path}': {e}");
                return;
            }
        };

        let line = format!(
            "{},{},{},{},{}\n",
            config.level_path, self.solved, self.sum_of_costs, self.time_ms, self.high_level_expansions,
        );

        if let Err(e) = file.write_all(line.as_bytes()) {
            error!("failed to write to stats file '{output_path}': {e}");
        }
    }
}
