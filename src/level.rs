//! Grid and level loading (C1/C8). The wall mask and entity tables are a
//! static, immutable-after-construction input to every searcher; the text
//! format parsed here is the declared external interface of spec §6
//! (`#domain` / `#colors` / `#initial` / `#goal`), not an elaborated
//! subsystem in its own right.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::path::Path;

use crate::color::Color;
use crate::common::{Agent, BoxEntity, Cell};
use crate::error::PlannerError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Level {
    pub height: usize,
    pub width: usize,
    walls: Vec<Vec<bool>>,
    pub agents: Vec<Agent>,
    pub boxes: Vec<BoxEntity>,
    /// Precomputed BFS distance-to-goal table per agent, indexed by
    /// `agent.id`. `heuristic[id][r][c] == usize::MAX` if unreachable.
    agent_heuristic: Vec<Vec<Vec<usize>>>,
    /// Same, per box goal (indexed by `box.id`).
    box_heuristic: Vec<Vec<Vec<usize>>>,
}

impl Level {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlannerError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            PlannerError::MalformedLevel(format!("cannot read level file: {e}"))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, PlannerError> {
        let mut lines = text.lines();

        let header = |lines: &mut std::str::Lines, tag: &str| -> Result<(), PlannerError> {
            let line = lines
                .next()
                .ok_or_else(|| PlannerError::MalformedLevel(format!("missing {tag}")))?;
            if line.trim() != tag {
                return Err(PlannerError::MalformedLevel(format!(
                    "expected {tag}, got {line}"
                )));
            }
            Ok(())
        };

        header(&mut lines, "#domain")?;
        lines
            .next()
            .ok_or_else(|| PlannerError::MalformedLevel("missing domain name".into()))?;
        header(&mut lines, "#levelname")?;
        lines
            .next()
            .ok_or_else(|| PlannerError::MalformedLevel("missing level name".into()))?;
        header(&mut lines, "#colors")?;

        let mut agent_colors: HashMap<char, Color> = HashMap::new();
        let mut box_colors: HashMap<char, Color> = HashMap::new();

        let mut line = lines
            .next()
            .ok_or_else(|| PlannerError::MalformedLevel("missing #initial".into()))?;
        while !line.starts_with('#') {
            let (color_str, entities) = line.split_once(':').ok_or_else(|| {
                PlannerError::MalformedLevel(format!("malformed color line: {line}"))
            })?;
            let color = Color::new(color_str.trim());
            for entity in entities.split(',') {
                let entity = entity.trim();
                if entity.len() != 1 {
                    continue;
                }
                let c = entity.chars().next().unwrap();
                if c.is_ascii_digit() {
                    agent_colors.insert(c, color.clone());
                } else if c.is_ascii_uppercase() {
                    box_colors.insert(c, color.clone());
                }
            }
            line = lines
                .next()
                .ok_or_else(|| PlannerError::MalformedLevel("missing #initial".into()))?;
        }
        if line.trim() != "#initial" {
            return Err(PlannerError::MalformedLevel(format!(
                "expected #initial, got {line}"
            )));
        }

        let mut grid_lines = Vec::new();
        let mut line = lines
            .next()
            .ok_or_else(|| PlannerError::MalformedLevel("missing #goal".into()))?;
        while !line.starts_with('#') {
            grid_lines.push(line);
            line = lines
                .next()
                .ok_or_else(|| PlannerError::MalformedLevel("missing #goal".into()))?;
        }
        if line.trim() != "#goal" {
            return Err(PlannerError::MalformedLevel(format!(
                "expected #goal, got {line}"
            )));
        }

        let height = grid_lines.len();
        let width = grid_lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

        let mut walls = vec![vec![false; width]; height];
        let mut agent_starts: HashMap<char, Cell> = HashMap::new();
        let mut box_starts: HashMap<char, Cell> = HashMap::new();

        for (r, row) in grid_lines.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                match ch {
                    '+' => walls[r][c] = true,
                    d if d.is_ascii_digit() => {
                        agent_starts.insert(d, (r, c));
                    }
                    letter if letter.is_ascii_uppercase() => {
                        box_starts.insert(letter, (r, c));
                    }
                    _ => {}
                }
            }
        }

        let mut agent_goals: HashMap<char, Cell> = HashMap::new();
        let mut box_goals: HashMap<char, Cell> = HashMap::new();

        let mut goal_lines = Vec::new();
        let mut next = lines.next();
        while let Some(l) = next {
            if l.starts_with('#') {
                break;
            }
            goal_lines.push(l);
            next = lines.next();
        }
        for (r, row) in goal_lines.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                match ch {
                    d if d.is_ascii_digit() => {
                        agent_goals.insert(d, (r, c));
                    }
                    letter if letter.is_ascii_uppercase() => {
                        box_goals.insert(letter, (r, c));
                    }
                    _ => {}
                }
            }
        }

        let mut agent_ids: Vec<char> = agent_starts.keys().copied().collect();
        agent_ids.sort_unstable();
        let agents: Vec<Agent> = agent_ids
            .iter()
            .enumerate()
            .map(|(idx, &symbol)| Agent {
                id: idx,
                color: agent_colors
                    .get(&symbol)
                    .cloned()
                    .unwrap_or_else(|| Color::new("none")),
                start: agent_starts[&symbol],
                goal: agent_goals.get(&symbol).copied(),
            })
            .collect();

        let mut box_ids: Vec<char> = box_starts.keys().copied().collect();
        box_ids.sort_unstable();
        let boxes: Vec<BoxEntity> = box_ids
            .iter()
            .enumerate()
            .map(|(idx, &symbol)| BoxEntity {
                id: idx,
                symbol,
                color: box_colors
                    .get(&symbol)
                    .cloned()
                    .unwrap_or_else(|| Color::new("none")),
                start: box_starts[&symbol],
                goal: box_goals.get(&symbol).copied(),
            })
            .collect();

        if agents.is_empty() {
            return Err(PlannerError::MalformedLevel("level has no agents".into()));
        }

        let mut level = Level {
            height,
            width,
            walls,
            agents,
            boxes,
            agent_heuristic: Vec::new(),
            box_heuristic: Vec::new(),
        };
        level.agent_heuristic = level
            .agents
            .iter()
            .map(|a| match a.goal {
                Some(goal) => level.bfs_distance_table(goal),
                None => vec![vec![0usize; level.width]; level.height],
            })
            .collect();
        level.box_heuristic = level
            .boxes
            .iter()
            .map(|b| match b.goal {
                Some(goal) => level.bfs_distance_table(goal),
                None => vec![vec![0usize; level.width]; level.height],
            })
            .collect();

        Ok(level)
    }

    pub fn is_wall(&self, cell: Cell) -> bool {
        self.walls[cell.0][cell.1]
    }

    pub fn in_bounds(&self, row: i32, col: i32) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    pub fn is_passable(&self, row: i32, col: i32) -> bool {
        self.in_bounds(row, col) && !self.walls[row as usize][col as usize]
    }

    /// Manhattan-adjacent passable cells (N/S/E/W), not including a "stay".
    pub fn open_neighbors(&self, cell: Cell) -> Vec<Cell> {
        let (r, c) = (cell.0 as i32, cell.1 as i32);
        [(-1, 0), (1, 0), (0, -1), (0, 1)]
            .into_iter()
            .filter_map(|(dr, dc)| {
                let (nr, nc) = (r + dr, c + dc);
                self.is_passable(nr, nc).then_some((nr as usize, nc as usize))
            })
            .collect()
    }

    pub fn agent_heuristic_table(&self, agent_id: usize) -> &Vec<Vec<usize>> {
        &self.agent_heuristic[agent_id]
    }

    pub fn box_heuristic_table(&self, box_id: usize) -> &Vec<Vec<usize>> {
        &self.box_heuristic[box_id]
    }

    pub fn box_at(&self, cell: Cell) -> Option<&BoxEntity> {
        self.boxes.iter().find(|b| b.start == cell)
    }

    /// Dijkstra (uniform unit weights, so equivalent to BFS) distance table
    /// to `goal` over passable cells, admissible and consistent.
    fn bfs_distance_table(&self, goal: Cell) -> Vec<Vec<usize>> {
        let mut dist = vec![vec![usize::MAX; self.width]; self.height];
        let mut heap = BinaryHeap::new();

        dist[goal.0][goal.1] = 0;
        heap.push((Reverse(0usize), goal));

        while let Some((Reverse(cost), cell)) = heap.pop() {
            if cost > dist[cell.0][cell.1] {
                continue;
            }
            for next in self.open_neighbors(cell) {
                let next_cost = cost + 1;
                if next_cost < dist[next.0][next.1] {
                    dist[next.0][next.1] = next_cost;
                    heap.push((Reverse(next_cost), next));
                }
            }
        }

        dist
    }
}
