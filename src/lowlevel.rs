//! Single-agent space-time A* (C3). Plans one agent's path against a fixed
//! constraint set handed down from the high level; optionally the agent is
//! tasked with delivering one color-matched box, in which case the search
//! state is the joint (agent_cell, box_cell, time_step).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use tracing::instrument;

use crate::action::{action_table, Action, ActionKind};
use crate::common::{Agent, AgentPath, BoxEntity, Cell, Constraint, ConstraintTarget};
use crate::level::Level;

pub struct LowLevelTask<'a> {
    pub level: &'a Level,
    pub agent: &'a Agent,
    pub box_id: Option<usize>,
    pub boxes: &'a [BoxEntity],
    /// Ids of boxes assigned to *some* agent for delivery (possibly this
    /// one). A box in this set may be moved out of the way over the
    /// course of the joint plan, so it must not be treated as a
    /// permanent wall here; any clash with it is instead left to the
    /// `AgentBox`/`BoxBox` conflict machinery, the same way agent-agent
    /// interference is resolved purely through added constraints rather
    /// than baked-in obstacles.
    pub assigned_box_ids: &'a HashSet<usize>,
    pub constraints: &'a HashSet<Constraint>,
    pub node_budget: usize,
    pub time_horizon: usize,
}

type State = (Cell, Option<Cell>, usize);

struct LowLevelNode {
    agent_cell: Cell,
    box_cell: Option<Cell>,
    time_step: usize,
    g: usize,
    h: usize,
    action: Option<Action>,
    parent: Option<Rc<RefCell<LowLevelNode>>>,
}

impl LowLevelNode {
    fn f(&self) -> usize {
        self.g + self.h
    }
}

struct OpenOrderWrapper(Rc<RefCell<LowLevelNode>>);

impl PartialEq for OpenOrderWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for OpenOrderWrapper {}

impl PartialOrd for OpenOrderWrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenOrderWrapper {
    /// Smaller f first; ties broken toward larger g (deeper nodes, closer
    /// to being done); remaining ties broken lexicographically on
    /// (time_step, agent_cell, box_cell) for determinism.
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.borrow();
        let b = other.0.borrow();
        a.f()
            .cmp(&b.f())
            .then_with(|| b.g.cmp(&a.g))
            .then_with(|| a.time_step.cmp(&b.time_step))
            .then_with(|| a.agent_cell.cmp(&b.agent_cell))
            .then_with(|| a.box_cell.cmp(&b.box_cell))
    }
}

fn shift(cell: Cell, delta: (i32, i32)) -> Option<(i32, i32)> {
    Some((cell.0 as i32 + delta.0, cell.1 as i32 + delta.1))
}

fn neg(delta: (i32, i32)) -> (i32, i32) {
    (-delta.0, -delta.1)
}

/// Applies `action` to `(agent_cell, box_cell)`, returning the resulting
/// state if the action is physically legal here (ignoring walls/other
/// obstacles, which the caller checks separately).
fn apply_action(agent_cell: Cell, box_cell: Option<Cell>, action: &Action) -> Option<(Cell, Option<Cell>)> {
    let (ar, ac) = shift(agent_cell, action.agent_delta)?;
    if ar < 0 || ac < 0 {
        return None;
    }
    let agent_new = (ar as usize, ac as usize);

    match action.kind {
        ActionKind::NoOp | ActionKind::Move(_) => {
            if box_cell == Some(agent_new) {
                return None;
            }
            Some((agent_new, box_cell))
        }
        ActionKind::Push(_, box_dir) => {
            let b = box_cell?;
            if b != agent_new {
                return None;
            }
            let (br, bc) = shift(b, box_dir.delta())?;
            if br < 0 || bc < 0 {
                return None;
            }
            Some((agent_new, Some((br as usize, bc as usize))))
        }
        ActionKind::Pull(_, box_dir) => {
            let b = box_cell?;
            let (er, ec) = shift(agent_cell, neg(box_dir.delta()))?;
            if er < 0 || ec < 0 || (er as usize, ec as usize) != b {
                return None;
            }
            Some((agent_new, Some(agent_cell)))
        }
    }
}

fn heuristic(level: &Level, task: &LowLevelTask, agent_cell: Cell, box_cell: Option<Cell>) -> usize {
    let agent_h = level.agent_heuristic_table(task.agent.id)[agent_cell.0][agent_cell.1];
    match (task.box_id, box_cell) {
        (Some(box_id), Some(bc)) => {
            let box_h = level.box_heuristic_table(box_id)[bc.0][bc.1];
            let approach = (agent_cell.0 as i32 - bc.0 as i32).unsigned_abs() as usize
                + (agent_cell.1 as i32 - bc.1 as i32).unsigned_abs() as usize;
            approach.saturating_sub(1) + box_h
        }
        _ => agent_h,
    }
}

fn violates(constraints: &HashSet<Constraint>, agent_id: usize, target: ConstraintTarget, cell: Cell, t: usize) -> bool {
    constraints
        .iter()
        .any(|c| c.agent_id == agent_id && c.target == target && c.cell == cell && c.time_step == t)
}

/// Latest time_step at which any constraint still pins the agent (or its
/// delivered box) to its goal cell; waiting until past this is sufficient
/// to guarantee the goal test holds indefinitely (the virtual-tail
/// convention used by the rest of the planner).
fn t_last_goal_constraint(task: &LowLevelTask) -> usize {
    let agent_goal = task.agent.goal;
    let box_goal = task.box_id.and_then(|id| task.boxes[id].goal);

    task.constraints
        .iter()
        .filter(|c| c.agent_id == task.agent.id)
        .filter(|c| match c.target {
            ConstraintTarget::Agent => Some(c.cell) == agent_goal,
            ConstraintTarget::Box => box_goal == Some(c.cell),
        })
        .map(|c| c.time_step)
        .max()
        .unwrap_or(0)
}

fn is_goal(task: &LowLevelTask, agent_cell: Cell, box_cell: Option<Cell>, t: usize, t_last_goal: usize) -> bool {
    if t < t_last_goal {
        return false;
    }
    if let Some(goal) = task.agent.goal {
        if agent_cell != goal {
            return false;
        }
    }
    match task.box_id {
        Some(box_id) => match task.boxes[box_id].goal {
            Some(box_goal) => box_cell == Some(box_goal),
            None => true,
        },
        None => true,
    }
}

/// Boxes nobody will ever move (not this task's own box, and not assigned
/// to any other agent either) sit at their start cell for the whole
/// horizon, so they act as walls. A box assigned to another agent is left
/// out here even though it hasn't moved yet at search time: it may be
/// pushed out of the way later in the joint plan, and a clash with it is
/// a job for `AgentBox`/`BoxBox` conflict detection, not a dead end baked
/// into every agent's low-level search.
fn static_obstacles(task: &LowLevelTask) -> HashSet<Cell> {
    task.boxes
        .iter()
        .filter(|b| Some(b.id) != task.box_id && !task.assigned_box_ids.contains(&b.id))
        .map(|b| b.start)
        .collect()
}

fn candidate_actions(box_involved: bool) -> Vec<Action> {
    if box_involved {
        action_table()
    } else {
        action_table()
            .into_iter()
            .filter(|a| matches!(a.kind, ActionKind::NoOp | ActionKind::Move(_)))
            .collect()
    }
}

/// Plans a single agent's path (optionally delivering one box) under a
/// fixed set of space-time constraints. Returns `None` if no such path
/// exists within `node_budget` expansions.
#[instrument(skip(task), fields(agent_id = task.agent.id, box_id = ?task.box_id))]
pub fn search(task: &LowLevelTask) -> Option<AgentPath> {
    let level = task.level;
    let obstacles = static_obstacles(task);
    let box_start = task.box_id.map(|id| task.boxes[id].start);
    let t_last_goal = t_last_goal_constraint(task);
    let actions = candidate_actions(task.box_id.is_some());

    let root = Rc::new(RefCell::new(LowLevelNode {
        agent_cell: task.agent.start,
        box_cell: box_start,
        time_step: 0,
        g: 0,
        h: heuristic(level, task, task.agent.start, box_start),
        action: None,
        parent: None,
    }));

    let mut open = BTreeSet::new();
    open.insert(OpenOrderWrapper(root.clone()));
    let mut best_g: HashMap<State, usize> = HashMap::new();
    best_g.insert((task.agent.start, box_start, 0), 0);

    let mut expansions = 0usize;

    while let Some(wrapper) = open.iter().next().map(|w| OpenOrderWrapper(w.0.clone())) {
        open.remove(&wrapper);
        let current = wrapper.0;

        let (agent_cell, box_cell, t, g) = {
            let node = current.borrow();
            (node.agent_cell, node.box_cell, node.time_step, node.g)
        };

        if is_goal(task, agent_cell, box_cell, t, t_last_goal) {
            return Some(reconstruct(current, task.box_id));
        }

        expansions += 1;
        if expansions > task.node_budget {
            return None;
        }

        for action in &actions {
            let Some((next_agent, next_box)) = apply_action(agent_cell, box_cell, action) else {
                continue;
            };
            if level.is_wall(next_agent) || obstacles.contains(&next_agent) {
                continue;
            }
            if let Some(nb) = next_box {
                if level.is_wall(nb) || obstacles.contains(&nb) {
                    continue;
                }
            }
            let next_t = t + 1;
            if next_t > task.time_horizon {
                continue;
            }
            if violates(task.constraints, task.agent.id, ConstraintTarget::Agent, next_agent, next_t) {
                continue;
            }
            if let Some(nb) = next_box {
                if violates(task.constraints, task.agent.id, ConstraintTarget::Box, nb, next_t) {
                    continue;
                }
            }

            let next_g = g + 1;
            let key = (next_agent, next_box, next_t);
            if best_g.get(&key).is_some_and(|&best| best <= next_g) {
                continue;
            }
            best_g.insert(key, next_g);

            let child = Rc::new(RefCell::new(LowLevelNode {
                agent_cell: next_agent,
                box_cell: next_box,
                time_step: next_t,
                g: next_g,
                h: heuristic(level, task, next_agent, next_box),
                action: Some(*action),
                parent: Some(current.clone()),
            }));
            open.insert(OpenOrderWrapper(child));
        }
    }

    None
}

fn reconstruct(goal: Rc<RefCell<LowLevelNode>>, box_id: Option<usize>) -> AgentPath {
    let mut steps = Vec::new();
    let mut actions = Vec::new();
    let mut node = Some(goal);

    while let Some(n) = node {
        let borrowed = n.borrow();
        steps.push((borrowed.agent_cell, borrowed.time_step));
        if let Some(a) = borrowed.action {
            actions.push(a);
        }
        node = borrowed.parent.clone();
    }

    steps.reverse();
    actions.reverse();

    AgentPath {
        steps,
        actions,
        moved_box: box_id,
    }
}
