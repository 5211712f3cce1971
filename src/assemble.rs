//! Solution assembler (C6): pads every agent's path to a common horizon
//! with trailing NoOps at its goal cell, then flattens into one row of
//! joint actions per time step, in stable agent order. Pure and
//! deterministic.

use crate::action::{Action, ActionKind};
use crate::common::SolutionPaths;

/// One row per time step; each row has exactly one action per agent, in
/// agent-id order.
pub type JointPlan = Vec<Vec<Action>>;

pub fn assemble(paths: &SolutionPaths) -> JointPlan {
    let horizon = paths.horizon();
    let noop = Action::agent_only(ActionKind::NoOp, (0, 0));

    (0..horizon)
        .map(|t| {
            paths
                .0
                .iter()
                .map(|p| p.actions.get(t).copied().unwrap_or(noop))
                .collect()
        })
        .collect()
}
