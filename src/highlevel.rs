//! High-level Constraint Tree search (C5). A best-first search over sets
//! of space-time constraints: each node holds one joint plan (one path per
//! agent) consistent with its constraint set; expansion picks a conflict
//! in that plan and branches into children that each add one disjunct of
//! the conflict's constraint pair.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::common::{path_violates_agent_constraints, AgentPath, Constraint, SolutionPaths};
use crate::conflict::{detect_conflicts, select_conflict, synthesize};
use crate::error::{NoSolutionReason, PlannerError};
use crate::level::Level;
use crate::lowlevel::{self, LowLevelTask};

/// Per-agent box assignment: `agent_box[agent_id]` names the box (if any)
/// that agent is responsible for delivering.
pub struct Assignment {
    pub agent_box: Vec<Option<usize>>,
}

pub struct HighLevelLimits {
    pub expansion_budget: usize,
    pub low_level_node_budget: usize,
    pub time_horizon: usize,
    pub deadline: Instant,
    pub status_every: usize,
}

struct CtNode {
    constraints: Vec<Constraint>,
    paths: SolutionPaths,
    conflicts: Vec<crate::conflict::Conflict>,
}

impl CtNode {
    fn sum_of_costs(&self) -> usize {
        self.paths.sum_of_costs()
    }
}

struct CtOrderWrapper(Rc<RefCell<CtNode>>);

impl PartialEq for CtOrderWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for CtOrderWrapper {}

impl PartialOrd for CtOrderWrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CtOrderWrapper {
    /// Fewer sum-of-costs first; ties broken toward fewer constraints,
    /// then fewer remaining conflicts; a final id-based tiebreak (node
    /// creation order via pointer address is avoided for determinism, so
    /// we fall back to a content comparison of the constraint list).
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.borrow();
        let b = other.0.borrow();
        a.sum_of_costs()
            .cmp(&b.sum_of_costs())
            .then_with(|| a.constraints.len().cmp(&b.constraints.len()))
            .then_with(|| a.conflicts.len().cmp(&b.conflicts.len()))
            .then_with(|| a.constraints.cmp(&b.constraints))
    }
}

fn canonical_key(constraints: &[Constraint]) -> Vec<Constraint> {
    let mut sorted = constraints.to_vec();
    sorted.sort();
    sorted
}

fn plan_agent(level: &Level, assignment: &Assignment, constraints: &[Constraint], agent_id: usize, limits: &HighLevelLimits) -> Option<AgentPath> {
    let agent = &level.agents[agent_id];
    let box_id = assignment.agent_box[agent_id];
    let agent_constraints = crate::common::constraints_for_agent(constraints, agent_id);
    let assigned_box_ids: HashSet<usize> = assignment.agent_box.iter().filter_map(|b| *b).collect();
    let task = LowLevelTask {
        level,
        agent,
        box_id,
        boxes: &level.boxes,
        assigned_box_ids: &assigned_box_ids,
        constraints: &agent_constraints,
        node_budget: limits.low_level_node_budget,
        time_horizon: limits.time_horizon,
    };
    lowlevel::search(&task)
}

fn build_root(level: &Level, assignment: &Assignment, limits: &HighLevelLimits) -> Option<CtNode> {
    let mut paths = Vec::with_capacity(level.agents.len());
    for agent in &level.agents {
        let path = plan_agent(level, assignment, &[], agent.id, limits)?;
        paths.push(path);
    }
    let solution = SolutionPaths(paths);
    let conflicts = detect_conflicts(&solution, &level.boxes);
    Some(CtNode { constraints: Vec::new(), paths: solution, conflicts })
}

/// Runs the Constraint Tree search to completion, returning the
/// conflict-free joint plan with minimal sum of costs, or the reason no
/// plan could be found within the given limits.
#[instrument(skip(level, assignment, limits))]
pub fn search(level: &Level, assignment: &Assignment, limits: &HighLevelLimits) -> Result<(SolutionPaths, usize), NoSolutionReason> {
    let Some(root) = build_root(level, assignment, limits) else {
        return Err(NoSolutionReason::InfeasibleInitial);
    };

    let mut open = BTreeSet::new();
    let mut visited: HashSet<Vec<Constraint>> = HashSet::new();
    visited.insert(canonical_key(&root.constraints));
    open.insert(CtOrderWrapper(Rc::new(RefCell::new(root))));

    let mut expansions = 0usize;

    loop {
        if Instant::now() >= limits.deadline {
            return Err(NoSolutionReason::LimitTime);
        }
        let Some(wrapper) = open.iter().next().map(|w| CtOrderWrapper(w.0.clone())) else {
            return Err(NoSolutionReason::LimitOpenEmpty);
        };
        open.remove(&wrapper);
        let node = wrapper.0;

        if node.borrow().conflicts.is_empty() {
            return Ok((node.borrow().paths.clone(), expansions));
        }

        expansions += 1;
        if expansions > limits.expansion_budget {
            return Err(NoSolutionReason::LimitExpansions);
        }
        if limits.status_every > 0 && expansions % limits.status_every == 0 {
            info!(expansions, open_size = open.len(), "high-level search progress");
        }

        let conflict = {
            let borrowed = node.borrow();
            *select_conflict(&borrowed.conflicts).expect("non-empty conflicts checked above")
        };
        let branches = synthesize(&conflict);

        for branch in branches {
            let mut constraints = node.borrow().constraints.clone();
            constraints.extend(branch.iter().copied());
            let key = canonical_key(&constraints);
            if visited.contains(&key) {
                continue;
            }

            let replanned_agents: HashSet<usize> = branch.iter().map(|c| c.agent_id).collect();
            let mut paths = node.borrow().paths.0.clone();
            let mut feasible = true;
            for &agent_id in &replanned_agents {
                match plan_agent(level, assignment, &constraints, agent_id, limits) {
                    Some(p) => {
                        let agent_constraints = crate::common::constraints_for_agent(&constraints, agent_id);
                        if path_violates_agent_constraints(&p, &agent_constraints) {
                            panic!(
                                "{}",
                                PlannerError::InternalInvariantViolation(format!(
                                    "agent {agent_id} was replanned under a fresh constraint set but its returned path still occupies a forbidden cell"
                                ))
                            );
                        }
                        paths[agent_id] = p;
                    }
                    None => {
                        feasible = false;
                        break;
                    }
                }
            }
            if !feasible {
                continue;
            }

            visited.insert(key);
            let solution = SolutionPaths(paths);
            let child_conflicts = detect_conflicts(&solution, &level.boxes);
            open.insert(CtOrderWrapper(Rc::new(RefCell::new(CtNode {
                constraints,
                paths: solution,
                conflicts: child_conflicts,
            }))));
        }
    }
}
