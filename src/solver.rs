//! Top-level solve entry point: assigns boxes to color-matched agents,
//! drives the high-level search, and assembles the result into a joint
//! plan the CLI can serialize.

use std::time::{Duration, Instant};

use tracing::instrument;

use crate::assemble::{self, JointPlan};
use crate::config::Config;
use crate::error::NoSolutionReason;
use crate::highlevel::{self, Assignment, HighLevelLimits};
use crate::level::Level;

pub enum SolveOutcome {
    Solved {
        plan: JointPlan,
        sum_of_costs: usize,
        high_level_expansions: usize,
    },
    NoSolution(NoSolutionReason),
}

fn manhattan(a: (usize, usize), b: (usize, usize)) -> usize {
    (a.0 as i32 - b.0 as i32).unsigned_abs() as usize + (a.1 as i32 - b.1 as i32).unsigned_abs() as usize
}

/// Greedily assigns each box with a declared goal to its nearest
/// unclaimed same-color agent. Boxes left over (more deliverable boxes
/// than color-matched agents) are simply not delivered; full task
/// allocation across color groups is out of scope.
fn assign_boxes(level: &Level) -> Assignment {
    let mut agent_box = vec![None; level.agents.len()];

    let mut deliverable: Vec<usize> = level.boxes.iter().filter(|b| b.goal.is_some()).map(|b| b.id).collect();
    deliverable.sort_unstable();

    for box_id in deliverable {
        let b = &level.boxes[box_id];
        let best = level
            .agents
            .iter()
            .filter(|a| a.color == b.color && agent_box[a.id].is_none())
            .min_by_key(|a| manhattan(a.start, b.start));
        if let Some(agent) = best {
            agent_box[agent.id] = Some(box_id);
        }
    }

    Assignment { agent_box }
}

#[instrument(skip(level, config))]
pub fn solve(level: &Level, config: &Config) -> SolveOutcome {
    let assignment = assign_boxes(level);
    let limits = HighLevelLimits {
        expansion_budget: config.expansion_budget,
        low_level_node_budget: config.low_level_node_budget,
        time_horizon: config.time_horizon,
        deadline: Instant::now() + Duration::from_secs(config.timeout_secs),
        status_every: 1000,
    };

    match highlevel::search(level, &assignment, &limits) {
        Ok((paths, high_level_expansions)) => SolveOutcome::Solved {
            sum_of_costs: paths.sum_of_costs(),
            plan: assemble::assemble(&paths),
            high_level_expansions,
        },
        Err(reason) => SolveOutcome::NoSolution(reason),
    }
}
