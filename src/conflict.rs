//! Conflict detection and constraint synthesis over a joint plan (C4).
//! Box trajectories are not searched jointly with every agent; they are
//! reconstructed here by replaying the delivering agent's action deltas
//! against the box's initial cell, then scanned for occupancy clashes the
//! same way agent paths are.

use crate::common::{AgentPath, BoxEntity, Cell, Constraint, ConstraintTarget, SolutionPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Vertex { a1: usize, a2: usize, cell: Cell, t: usize },
    EdgeSwap { a1: usize, a2: usize, cell_a1_t: Cell, cell_a2_t: Cell, t: usize },
    Follow { leader: usize, trailer: usize, cell: Cell, t: usize },
    AgentBox { agent: usize, box_mover_agent: usize, cell: Cell, t: usize },
    BoxBox { mover_a: usize, mover_b: usize, cell: Cell, t: usize },
}

impl Conflict {
    fn kind_rank(&self) -> u8 {
        match self {
            Conflict::Vertex { .. } => 0,
            Conflict::EdgeSwap { .. } => 1,
            Conflict::Follow { .. } => 2,
            Conflict::AgentBox { .. } => 3,
            Conflict::BoxBox { .. } => 4,
        }
    }

    fn time(&self) -> usize {
        match self {
            Conflict::Vertex { t, .. }
            | Conflict::EdgeSwap { t, .. }
            | Conflict::Follow { t, .. }
            | Conflict::AgentBox { t, .. }
            | Conflict::BoxBox { t, .. } => *t,
        }
    }

    fn agent_pair(&self) -> (usize, usize) {
        let (x, y) = match self {
            Conflict::Vertex { a1, a2, .. } | Conflict::EdgeSwap { a1, a2, .. } => (*a1, *a2),
            Conflict::Follow { leader, trailer, .. } => (*leader, *trailer),
            Conflict::AgentBox { agent, box_mover_agent, .. } => (*agent, *box_mover_agent),
            Conflict::BoxBox { mover_a, mover_b, .. } => (*mover_a, *mover_b),
        };
        if x <= y {
            (x, y)
        } else {
            (y, x)
        }
    }
}

/// A box's reconstructed cell-at-time trace, under the virtual-tail
/// convention, along with who (if anyone) is delivering it.
pub struct BoxTrace {
    pub box_id: usize,
    pub mover_agent_id: Option<usize>,
    cells: Vec<Cell>,
}

impl BoxTrace {
    pub fn at(&self, t: usize) -> Cell {
        match self.cells.get(t) {
            Some(c) => *c,
            None => *self.cells.last().unwrap(),
        }
    }
}

pub fn build_box_traces(boxes: &[BoxEntity], paths: &SolutionPaths) -> Vec<BoxTrace> {
    boxes
        .iter()
        .map(|b| {
            let mover = paths.0.iter().enumerate().find(|(_, p)| p.moved_box == Some(b.id));
            match mover {
                None => BoxTrace {
                    box_id: b.id,
                    mover_agent_id: None,
                    cells: vec![b.start],
                },
                Some((agent_id, path)) => BoxTrace {
                    box_id: b.id,
                    mover_agent_id: Some(agent_id),
                    cells: replay(b.start, path),
                },
            }
        })
        .collect()
}

fn replay(start: Cell, path: &AgentPath) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(path.actions.len() + 1);
    let mut cur = start;
    cells.push(cur);
    for action in &path.actions {
        if action.box_delta != (0, 0) {
            cur = (
                (cur.0 as i32 + action.box_delta.0) as usize,
                (cur.1 as i32 + action.box_delta.1) as usize,
            );
        }
        cells.push(cur);
    }
    cells
}

/// Scans the joint plan for every conflict defined in the taxonomy.
pub fn detect_conflicts(paths: &SolutionPaths, boxes: &[BoxEntity]) -> Vec<Conflict> {
    let traces = build_box_traces(boxes, paths);
    let agent_horizon = paths.horizon();
    let box_horizon = traces.iter().map(|b| b.cells.len().saturating_sub(1)).max().unwrap_or(0);
    let horizon = agent_horizon.max(box_horizon);

    let n = paths.0.len();
    let mut conflicts = Vec::new();

    for t in 0..=horizon {
        for a in 0..n {
            for b in (a + 1)..n {
                let pa = paths.get(a).at(t);
                let pb = paths.get(b).at(t);
                if pa == pb {
                    conflicts.push(Conflict::Vertex { a1: a, a2: b, cell: pa, t });
                }
            }
        }

        for a in 0..n {
            let pa = paths.get(a).at(t);
            for bx in &traces {
                let Some(mover) = bx.mover_agent_id else { continue };
                if mover == a {
                    continue;
                }
                if pa == bx.at(t) {
                    conflicts.push(Conflict::AgentBox { agent: a, box_mover_agent: mover, cell: pa, t });
                }
            }
        }

        for i in 0..traces.len() {
            for j in (i + 1)..traces.len() {
                let (Some(ma), Some(mb)) = (traces[i].mover_agent_id, traces[j].mover_agent_id) else {
                    continue;
                };
                if traces[i].at(t) == traces[j].at(t) {
                    conflicts.push(Conflict::BoxBox { mover_a: ma, mover_b: mb, cell: traces[i].at(t), t });
                }
            }
        }

        if t == horizon {
            continue;
        }

        for a in 0..n {
            for b in (a + 1)..n {
                let pa_t = paths.get(a).at(t);
                let pb_t = paths.get(b).at(t);
                let pa_t1 = paths.get(a).at(t + 1);
                let pb_t1 = paths.get(b).at(t + 1);

                if pa_t1 == pb_t && pb_t1 == pa_t && pa_t != pa_t1 {
                    conflicts.push(Conflict::EdgeSwap {
                        a1: a,
                        a2: b,
                        cell_a1_t: pa_t,
                        cell_a2_t: pb_t,
                        t: t + 1,
                    });
                    continue;
                }
                if pb_t1 == pa_t {
                    conflicts.push(Conflict::Follow { leader: a, trailer: b, cell: pa_t, t: t + 1 });
                }
                if pa_t1 == pb_t {
                    conflicts.push(Conflict::Follow { leader: b, trailer: a, cell: pb_t, t: t + 1 });
                }
            }
        }
    }

    conflicts
}

/// Selects the conflict the high level should branch on this expansion:
/// earliest by time, ties by kind priority (Vertex > EdgeSwap > Follow >
/// AgentBox > BoxBox), remaining ties by the smaller agent-id pair.
pub fn select_conflict(conflicts: &[Conflict]) -> Option<&Conflict> {
    conflicts
        .iter()
        .min_by_key(|c| (c.time(), c.kind_rank(), c.agent_pair()))
}

/// Synthesizes the CT children's added constraints from a conflict. Most
/// kinds are disjunctive two-way branches (one constraint per child);
/// `Follow` is asymmetric (only the trailer is at fault) and yields a
/// single branch.
pub fn synthesize(conflict: &Conflict) -> Vec<Vec<Constraint>> {
    match *conflict {
        Conflict::Vertex { a1, a2, cell, t } => vec![
            vec![Constraint { agent_id: a1, target: ConstraintTarget::Agent, cell, time_step: t }],
            vec![Constraint { agent_id: a2, target: ConstraintTarget::Agent, cell, time_step: t }],
        ],
        Conflict::EdgeSwap { a1, a2, cell_a1_t, cell_a2_t, t } => vec![
            vec![Constraint { agent_id: a1, target: ConstraintTarget::Agent, cell: cell_a2_t, time_step: t }],
            vec![Constraint { agent_id: a2, target: ConstraintTarget::Agent, cell: cell_a1_t, time_step: t }],
        ],
        Conflict::Follow { trailer, cell, t, .. } => {
            vec![vec![Constraint { agent_id: trailer, target: ConstraintTarget::Agent, cell, time_step: t }]]
        }
        Conflict::AgentBox { agent, box_mover_agent, cell, t } => vec![
            vec![Constraint { agent_id: agent, target: ConstraintTarget::Agent, cell, time_step: t }],
            vec![Constraint { agent_id: box_mover_agent, target: ConstraintTarget::Box, cell, time_step: t }],
        ],
        Conflict::BoxBox { mover_a, mover_b, cell, t } => vec![
            vec![Constraint { agent_id: mover_a, target: ConstraintTarget::Box, cell, time_step: t }],
            vec![Constraint { agent_id: mover_b, target: ConstraintTarget::Box, cell, time_step: t }],
        ],
    }
}
