//! Value types shared across the planner (C2): cells, constraints, path
//! entries, agent/box plans and the joint solution they compose into.

use std::collections::HashSet;

use crate::action::Action;
use crate::color::Color;

pub type Cell = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    pub id: usize,
    pub color: Color,
    pub start: Cell,
    pub goal: Option<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BoxEntity {
    pub id: usize,
    pub symbol: char,
    pub color: Color,
    pub start: Cell,
    pub goal: Option<Cell>,
}

/// Whether a constraint forbids the constrained agent's own cell, or (when
/// the agent is delivering a box) the box's cell, at the given time. Most
/// conflicts constrain the agent; AgentBox/BoxBox conflicts may instead
/// need to forbid the box landing somewhere, which the mover's agent-cell
/// alone doesn't pin down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintTarget {
    Agent,
    Box,
}

/// (agent_id, cell, time_step): the named agent (or the box it is
/// delivering, per `target`) must not occupy `cell` at `time_step`.
/// Edge-swap conflicts are encoded as a pair of these at `time_step + 1`
/// on the two agents' destination cells (see conflict.rs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
    pub agent_id: usize,
    pub target: ConstraintTarget,
    pub cell: Cell,
    pub time_step: usize,
}

/// (cell, time_step), strictly increasing in time_step from 0.
pub type PathEntry = (Cell, usize);

/// A single agent's plan: the cell/time trace plus the action that produced
/// each step (actions\[i\] transitions steps\[i\] -> steps\[i+1\], so
/// actions.len() == steps.len() - 1). If this agent is responsible for
/// delivering a box, `moved_box` names it; the box's own trajectory is
/// reconstructed by replaying `actions`' box deltas from the box's start
/// cell (see conflict.rs::box_trajectory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPath {
    pub steps: Vec<PathEntry>,
    pub actions: Vec<Action>,
    pub moved_box: Option<usize>,
}

impl AgentPath {
    /// Number of actions taken (the "action count" cost used throughout;
    /// per I4 this is `max(0, path_length - 1)` where path_length counts
    /// entries).
    pub fn cost(&self) -> usize {
        self.actions.len()
    }

    pub fn start_cell(&self) -> Cell {
        self.steps[0].0
    }

    pub fn goal_cell(&self) -> Cell {
        self.steps.last().expect("path must have at least one step").0
    }

    /// Location of the agent at time `t`, using the virtual-tail
    /// convention: an agent at its last recorded entry is treated as
    /// remaining there indefinitely.
    pub fn at(&self, t: usize) -> Cell {
        match self.steps.get(t) {
            Some((cell, _)) => *cell,
            None => self.steps.last().unwrap().0,
        }
    }

    pub fn last_time_step(&self) -> usize {
        self.steps.last().unwrap().1
    }

    /// True if this path ever has the agent at `cell` at `time_step`,
    /// under the virtual-tail convention (used only for diagnostics; the
    /// low level enforces constraints directly during search).
    pub fn occupies(&self, cell: Cell, time_step: usize) -> bool {
        self.at(time_step) == cell
    }
}

/// Maps agent id -> its plan, indexed by stable agent order (ids are
/// contiguous from 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionPaths(pub Vec<AgentPath>);

impl SolutionPaths {
    pub fn get(&self, agent_id: usize) -> &AgentPath {
        &self.0[agent_id]
    }

    pub fn sum_of_costs(&self) -> usize {
        self.0.iter().map(|p| p.cost()).sum()
    }

    pub fn horizon(&self) -> usize {
        self.0.iter().map(|p| p.last_time_step()).max().unwrap_or(0)
    }
}

/// True if `path` sits at one of `constraints`' pinned agent-target cells
/// at its pinned time_step. A post-replan sanity check (see
/// `highlevel.rs`): the low level enforces constraints directly during
/// search, so this should never be true for a path it returns.
pub fn path_violates_agent_constraints(path: &AgentPath, constraints: &HashSet<Constraint>) -> bool {
    constraints
        .iter()
        .filter(|c| c.target == ConstraintTarget::Agent)
        .any(|c| path.occupies(c.cell, c.time_step))
}

/// Per-agent constraint set, filtered from a CT node's full constraint
/// multiset by agent_id before being handed to the low level.
pub fn constraints_for_agent(all: &[Constraint], agent_id: usize) -> HashSet<Constraint> {
    all.iter()
        .filter(|c| c.agent_id == agent_id)
        .copied()
        .collect()
}
