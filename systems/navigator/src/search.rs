//! Resumable best-first grid search driven in budgeted slices.

use std::{cmp::Ordering, collections::BinaryHeap};

use tower_siege_core::{
    MatrixPosition, TileGraph, DIAGONAL_STEP, MIN_TERRAIN_COST, ORTHOGONAL_STEP,
};

const UNVISITED: u32 = u32::MAX;

const CARDINAL_OFFSETS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
const DIAGONAL_OFFSETS: [(i32, i32); 4] = [(1, -1), (1, 1), (-1, 1), (-1, -1)];

/// Outcome of advancing a search by one slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SearchProgress {
    /// Budget ran out before the search finished.
    Pending,
    /// Waypoints from the start (exclusive) to the goal (inclusive).
    Found(Vec<MatrixPosition>),
    /// Every reachable cell was expanded without meeting the goal.
    Exhausted,
}

/// Partial A* state that survives between ticks.
///
/// Dense score and parent buffers mirror the graph dimensions captured when
/// the search started. Level changes do not discard the state: expansion reads
/// walkability live, and the scheduler validates the finished route against
/// the current graph. `seeded_revision` tells it whether an exhausted search
/// ran against a level that has since changed.
#[derive(Debug)]
pub(crate) struct SearchState {
    start: MatrixPosition,
    goal: MatrixPosition,
    seeded_revision: u64,
    observed_revision: u64,
    width: u32,
    height: u32,
    allow_diagonals: bool,
    open: BinaryHeap<OpenNode>,
    g_score: Vec<u32>,
    parent: Vec<Option<usize>>,
    closed: Vec<bool>,
    sequence: u64,
}

impl SearchState {
    /// Seeds a new search from `start` toward `goal` against the graph's
    /// current revision.
    pub(crate) fn new<G: TileGraph>(
        graph: &G,
        start: MatrixPosition,
        goal: MatrixPosition,
        allow_diagonals: bool,
    ) -> Self {
        let (width, height) = graph.dimensions();
        let cell_count = usize::try_from(u64::from(width) * u64::from(height)).unwrap_or(0);

        let mut state = Self {
            start,
            goal,
            seeded_revision: graph.revision(),
            observed_revision: graph.revision(),
            width,
            height,
            allow_diagonals,
            open: BinaryHeap::new(),
            g_score: vec![UNVISITED; cell_count],
            parent: vec![None; cell_count],
            closed: vec![false; cell_count],
            sequence: 0,
        };

        if let Some(index) = state.index(start) {
            state.g_score[index] = 0;
            state.push(index, 0, state.heuristic(start));
        }

        state
    }

    /// Reports whether the graph changed since the search was seeded.
    pub(crate) fn is_stale(&self, revision: u64) -> bool {
        self.seeded_revision != revision
    }

    /// Records `revision` as seen; returns `true` when it differs from the
    /// previously observed one.
    pub(crate) fn observe(&mut self, revision: u64) -> bool {
        let changed = self.observed_revision != revision;
        self.observed_revision = revision;
        changed
    }

    /// Goal the search is routing toward.
    pub(crate) fn goal(&self) -> MatrixPosition {
        self.goal
    }

    /// Expands up to `*budget` nodes, decrementing the budget for each node
    /// popped from the open set.
    pub(crate) fn advance<G: TileGraph>(&mut self, graph: &G, budget: &mut u32) -> SearchProgress {
        while *budget > 0 {
            let Some(node) = self.open.pop() else {
                return SearchProgress::Exhausted;
            };
            *budget -= 1;

            let index = node.index;
            if self.closed[index] {
                continue;
            }
            let cell = self.cell(index);
            // Blocked after it was queued; left unclosed so a later relax can
            // still reach it once it opens again.
            if cell != self.start && !graph.is_walkable(cell) {
                continue;
            }
            self.closed[index] = true;

            if cell == self.goal {
                return SearchProgress::Found(self.reconstruct(index));
            }

            self.expand(graph, cell, index);
        }

        if self.open.is_empty() {
            SearchProgress::Exhausted
        } else {
            SearchProgress::Pending
        }
    }

    fn expand<G: TileGraph>(&mut self, graph: &G, cell: MatrixPosition, index: usize) {
        let current = self.g_score[index];

        for (dx, dy) in CARDINAL_OFFSETS {
            self.relax(graph, cell, index, current, dx, dy, ORTHOGONAL_STEP);
        }

        if !self.allow_diagonals {
            return;
        }

        for (dx, dy) in DIAGONAL_OFFSETS {
            // No corner cutting: both orthogonal neighbours must be open.
            let horizontal = cell.offset(dx, 0, self.width, self.height);
            let vertical = cell.offset(0, dy, self.width, self.height);
            let open_corner = horizontal.is_some_and(|c| graph.is_walkable(c))
                && vertical.is_some_and(|c| graph.is_walkable(c));
            if open_corner {
                self.relax(graph, cell, index, current, dx, dy, DIAGONAL_STEP);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn relax<G: TileGraph>(
        &mut self,
        graph: &G,
        cell: MatrixPosition,
        index: usize,
        current: u32,
        dx: i32,
        dy: i32,
        step: u32,
    ) {
        let Some(neighbor) = cell.offset(dx, dy, self.width, self.height) else {
            return;
        };
        let Some(cost) = graph.traversal_cost(neighbor) else {
            return;
        };
        let Some(neighbor_index) = self.index(neighbor) else {
            return;
        };
        if self.closed[neighbor_index] {
            return;
        }

        let tentative = current.saturating_add(step.saturating_mul(cost));
        if tentative >= self.g_score[neighbor_index] {
            return;
        }

        self.g_score[neighbor_index] = tentative;
        self.parent[neighbor_index] = Some(index);
        self.push(neighbor_index, tentative, self.heuristic(neighbor));
    }

    fn push(&mut self, index: usize, g: u32, h: u32) {
        self.sequence += 1;
        self.open.push(OpenNode {
            f: g.saturating_add(h),
            h,
            sequence: self.sequence,
            index,
        });
    }

    fn heuristic(&self, cell: MatrixPosition) -> u32 {
        let distance = if self.allow_diagonals {
            cell.octile_distance(self.goal)
        } else {
            cell.manhattan_distance(self.goal) * ORTHOGONAL_STEP
        };
        distance * MIN_TERRAIN_COST
    }

    fn reconstruct(&self, goal_index: usize) -> Vec<MatrixPosition> {
        let mut waypoints = Vec::new();
        let mut cursor = Some(goal_index);
        while let Some(index) = cursor {
            let cell = self.cell(index);
            if cell == self.start {
                break;
            }
            waypoints.push(cell);
            cursor = self.parent[index];
        }
        waypoints.reverse();
        waypoints
    }

    fn index(&self, cell: MatrixPosition) -> Option<usize> {
        if cell.x() >= self.width || cell.y() >= self.height {
            return None;
        }
        let width = usize::try_from(self.width).ok()?;
        let row = usize::try_from(cell.y()).ok()?;
        let column = usize::try_from(cell.x()).ok()?;
        let index = row.checked_mul(width)?.checked_add(column)?;
        (index < self.closed.len()).then_some(index)
    }

    fn cell(&self, index: usize) -> MatrixPosition {
        let width = self.width as usize;
        // Both quotient and remainder are bounded by the u32 grid extent.
        let column = u32::try_from(index % width).unwrap_or(u32::MAX);
        let row = u32::try_from(index / width).unwrap_or(u32::MAX);
        MatrixPosition::new(column, row)
    }
}

/// Open-set entry ordered so that [`BinaryHeap`] pops the lowest `f` first,
/// breaking ties toward the goal and then by insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenNode {
    f: u32,
    h: u32,
    sequence: u64,
    index: usize,
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
