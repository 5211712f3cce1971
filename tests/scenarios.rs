//! Cross-module scenario tests exercising the whole solve pipeline
//! (level parsing -> high-level CBS -> assembled joint plan).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use cbs_mapf::action::ActionKind;
use cbs_mapf::config::Config;
use cbs_mapf::error::NoSolutionReason;
use cbs_mapf::level::Level;
use cbs_mapf::solver::{self, SolveOutcome};

fn config() -> Config {
    Config {
        level_path: "scenario".to_string(),
        solution_path: "/dev/null".to_string(),
        output_path: None,
        expansion_budget: 20_000,
        time_horizon: 64,
        low_level_node_budget: 20_000,
        timeout_secs: 30,
    }
}

fn render(plan: &cbs_mapf::assemble::JointPlan) -> String {
    plan.iter()
        .map(|row| row.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

fn neighbors_incl_wait(level: &Level, cell: (usize, usize)) -> Vec<(usize, usize)> {
    let mut out = vec![cell];
    for (dr, dc) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
        let nr = cell.0 as i32 + dr;
        let nc = cell.1 as i32 + dc;
        if nr < 0 || nc < 0 {
            continue;
        }
        let n = (nr as usize, nc as usize);
        if n.0 < level.height && n.1 < level.width && !level.is_wall(n) {
            out.push(n);
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct JointState {
    c0: (usize, usize),
    c1: (usize, usize),
    parked0: bool,
    parked1: bool,
}

/// Exhaustive joint-state search over exactly two agents, used only as an
/// independent cross-check of the CBS-returned sum of costs on small
/// instances. An agent can "park" for free once it sits on its own goal
/// cell, matching the virtual-tail convention `AgentPath::at`/`cost` use:
/// a parked agent occupies its goal cell forever and stops accruing cost.
/// A transition is rejected exactly when it would reproduce one of this
/// crate's own conflict kinds: both agents land on the same cell (vertex),
/// or either agent lands on the cell the other just vacated (covers both
/// `Follow` directions and, when both hold at once, `EdgeSwap`).
fn brute_force_two_agent_sum_of_costs(level: &Level) -> usize {
    let agent0 = &level.agents[0];
    let agent1 = &level.agents[1];
    let goal0 = agent0.goal.unwrap();
    let goal1 = agent1.goal.unwrap();

    let start = JointState {
        c0: agent0.start,
        c1: agent1.start,
        parked0: false,
        parked1: false,
    };

    let mut best: HashMap<JointState, usize> = HashMap::new();
    best.insert(start, 0);
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0usize, start)));

    let options = |level: &Level, cell: (usize, usize), goal: (usize, usize), parked: bool| -> Vec<((usize, usize), bool, usize)> {
        if parked {
            return vec![(cell, true, 0)];
        }
        let mut opts: Vec<((usize, usize), bool, usize)> = neighbors_incl_wait(level, cell).into_iter().map(|c| (c, false, 1)).collect();
        if cell == goal {
            opts.push((cell, true, 0));
        }
        opts
    };

    while let Some(Reverse((cost, state))) = heap.pop() {
        if best.get(&state).is_some_and(|&known| known < cost) {
            continue;
        }
        if state.parked0 && state.parked1 {
            return cost;
        }

        let opts0 = options(level, state.c0, goal0, state.parked0);
        let opts1 = options(level, state.c1, goal1, state.parked1);

        for &(new0, park0, cost0) in &opts0 {
            for &(new1, park1, cost1) in &opts1 {
                if new0 == new1 || new0 == state.c1 || new1 == state.c0 {
                    continue;
                }
                let next = JointState { c0: new0, c1: new1, parked0: park0, parked1: park1 };
                let next_cost = cost + cost0 + cost1;
                if best.get(&next).map_or(true, |&known| next_cost < known) {
                    best.insert(next, next_cost);
                    heap.push(Reverse((next_cost, next)));
                }
            }
        }
    }

    panic!("brute force joint search exhausted without both agents reaching their goal");
}

const CORRIDOR_NO_BAY: &str = "\
#domain
hospital
#levelname
corridor-swap
#colors
blue: 0, 1
#initial
+++++
+0 1+
+++++
#goal
+++++
+1 0+
+++++
#end
";

const EDGE_SWAP_NO_BAY: &str = "\
#domain
hospital
#levelname
edge-swap
#colors
blue: 0, 1
#initial
+0 1+
#goal
+1 0+
#end
";

const VERTEX_ONLY_5X5: &str = "\
#domain
hospital
#levelname
vertex-only
#colors
blue: 0, 1
#initial
0....
.....
.....
.....
1....
#goal
....1
.....
.....
.....
....0
#end
";

const BOX_PUSH: &str = "\
#domain
hospital
#levelname
box-push
#colors
blue: 0, A
#initial
+++++++
+0A   +
+++++++
#goal
+++++++
+0   A+
+++++++
#end
";

#[test]
fn corridor_swap_without_a_bay_has_no_joint_solution() {
    let level = Level::parse(CORRIDOR_NO_BAY).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::NoSolution(reason) => {
            assert_eq!(reason, NoSolutionReason::LimitOpenEmpty);
        }
        SolveOutcome::Solved { .. } => panic!("a 1-wide lane swap with no bay must not be solvable"),
    }
}

#[test]
fn edge_swap_without_a_bay_has_no_joint_solution() {
    let level = Level::parse(EDGE_SWAP_NO_BAY).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::NoSolution(reason) => {
            assert_eq!(reason, NoSolutionReason::LimitOpenEmpty);
        }
        SolveOutcome::Solved { .. } => panic!("a 1x3 row swap with no bay must not be solvable"),
    }
}

#[test]
fn vertex_only_conflict_resolves_with_no_extra_cost() {
    let level = Level::parse(VERTEX_ONLY_5X5).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::Solved { sum_of_costs, plan, .. } => {
            assert_eq!(sum_of_costs, 16);
            // conflict-free by construction (solver only returns conflict-free plans);
            // sanity-check both agents actually reach their declared goal lengths.
            assert!(!plan.is_empty());
        }
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    }
}

#[test]
fn box_push_plan_contains_a_push_action() {
    let level = Level::parse(BOX_PUSH).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::Solved { plan, .. } => {
            let has_push = plan
                .iter()
                .flatten()
                .any(|a| matches!(a.kind, ActionKind::Push(_, _)));
            assert!(has_push, "expected a Push action delivering the box");
        }
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    }
}

#[test]
fn repeated_solves_are_byte_identical() {
    let level = Level::parse(VERTEX_ONLY_5X5).unwrap();
    let first = match solver::solve(&level, &config()) {
        SolveOutcome::Solved { plan, .. } => render(&plan),
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    };
    let second = match solver::solve(&level, &config()) {
        SolveOutcome::Solved { plan, .. } => render(&plan),
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    };
    assert_eq!(first, second);
}

/// A small instance with a side bay wide enough for one agent to step out
/// of the corridor so the other can pass; unlike the no-bay scenarios this
/// one must be solvable, at some cost above the unobstructed minimum.
#[test]
fn a_side_bay_makes_an_otherwise_blocked_swap_solvable() {
    const WITH_BAY: &str = "\
#domain
hospital
#levelname
bay
#colors
blue: 0, 1
#initial
++++++
+0  1+
+   ++
++++++
#goal
++++++
+1  0+
+   ++
++++++
#end
";
    let level = Level::parse(WITH_BAY).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::Solved { sum_of_costs, .. } => {
            // Unobstructed each agent needs 3 actions; the detour through
            // the bay plus the no-immediate-follow buffer costs strictly
            // more than the unobstructed 6, but well under the horizon.
            assert!(sum_of_costs > 6);
            assert!(sum_of_costs < 20);
        }
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    }
}

/// A 1x10 open row with agents swapping ends, plus a single-cell bay off
/// one column wide enough for one agent to step out of the lane. Without
/// the bay this is the same unsolvable shape as the no-bay corridor/edge-
/// swap scenarios; with it, exactly one agent can duck aside to let the
/// other through. The true minimal sum of costs is cross-checked against
/// an independent brute-force joint search rather than a hand-computed
/// constant: the exact wait this detour needs interacts with the
/// no-immediate-follow buffer the same way it does in
/// `a_side_bay_makes_an_otherwise_blocked_swap_solvable` above, so a
/// literal hand-derived number isn't asserted here either.
#[test]
fn pass_through_row_with_a_bay_matches_brute_force_and_requires_a_detour() {
    const PASS_THROUGH: &str = "\
#domain
hospital
#levelname
pass-through
#colors
blue: 0, 1
#initial
++++++++++++
+0        1+
+++++ ++++++
++++++++++++
#goal
++++++++++++
+1        0+
++++++++++++
++++++++++++
#end
";
    let level = Level::parse(PASS_THROUGH).unwrap();
    let cbs_sum_of_costs = match solver::solve(&level, &config()) {
        SolveOutcome::Solved { sum_of_costs, .. } => sum_of_costs,
        SolveOutcome::NoSolution(reason) => panic!("a bay wide enough for one agent must make this solvable, got {reason}"),
    };
    // Unobstructed, each agent needs 9 actions (18 total); the detour
    // through the bay must cost strictly more.
    assert!(cbs_sum_of_costs > 18);
    assert_eq!(cbs_sum_of_costs, brute_force_two_agent_sum_of_costs(&level));
}

/// Direct cross-check of CBS optimality against an exhaustive joint
/// search on a small instance (2 agents, 5x5 grid), independent of any
/// hand-computed expectation.
#[test]
fn cbs_sum_of_costs_matches_brute_force_joint_search() {
    let level = Level::parse(VERTEX_ONLY_5X5).unwrap();
    let cbs_sum_of_costs = match solver::solve(&level, &config()) {
        SolveOutcome::Solved { sum_of_costs, .. } => sum_of_costs,
        SolveOutcome::NoSolution(reason) => panic!("expected a solution, got {reason}"),
    };
    assert_eq!(cbs_sum_of_costs, brute_force_two_agent_sum_of_costs(&level));
}

/// A single-agent level whose declared goal cell is a wall in `#initial`
/// (the wall mask is built only from the `#initial` grid) is unreachable
/// before any joint search even starts.
#[test]
fn an_unreachable_goal_cell_surfaces_infeasible_initial() {
    const UNREACHABLE_GOAL: &str = "\
#domain
hospital
#levelname
unreachable-goal
#colors
blue: 0
#initial
+++++
+0  +
+++++
#goal
+0+++
+   +
+++++
#end
";
    let level = Level::parse(UNREACHABLE_GOAL).unwrap();
    match solver::solve(&level, &config()) {
        SolveOutcome::NoSolution(reason) => assert_eq!(reason, NoSolutionReason::InfeasibleInitial),
        SolveOutcome::Solved { .. } => panic!("a goal cell that is a wall in #initial must not be reachable"),
    }
}

/// A zero expansion budget can't resolve even the first conflict in an
/// otherwise-solvable instance.
#[test]
fn a_starved_expansion_budget_surfaces_limit_expansions() {
    let level = Level::parse(VERTEX_ONLY_5X5).unwrap();
    let mut starved = config();
    starved.expansion_budget = 0;
    match solver::solve(&level, &starved) {
        SolveOutcome::NoSolution(reason) => assert_eq!(reason, NoSolutionReason::LimitExpansions),
        SolveOutcome::Solved { .. } => panic!("a zero expansion budget must not be enough to resolve any conflict"),
    }
}

/// A deadline that has already elapsed by construction surfaces
/// `LimitTime` on the very first loop check, before any expansion.
#[test]
fn a_zero_second_timeout_surfaces_limit_time() {
    let level = Level::parse(VERTEX_ONLY_5X5).unwrap();
    let mut rushed = config();
    rushed.timeout_secs = 0;
    match solver::solve(&level, &rushed) {
        SolveOutcome::NoSolution(reason) => assert_eq!(reason, NoSolutionReason::LimitTime),
        SolveOutcome::Solved { .. } => panic!("a zero-second timeout must already be elapsed by the first deadline check"),
    }
}
