#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Time-sliced path-finding scheduler shared by every NPC in a world.
//!
//! Requesters submit start/goal pairs through [`Navigator::create_task`] and
//! keep the returned [`NavigatorTask`] handle. The world drives
//! [`Navigator::tick`] once per frame; each tick spends at most a fixed number
//! of node expansions, servicing tasks strictly in creation order. A search
//! that runs out of budget keeps its open set and resumes on the next tick,
//! even when the level changed in between. Walkability is read live from the
//! [`TileGraph`] on every expansion and a finished route is checked against
//! the current graph before delivery, so a resolved path never crosses a cell
//! that was blocked when it resolved. A search whose result went stale is
//! reseeded and sent to the back of the queue, so the tasks behind it keep
//! being serviced.

mod search;
mod task;

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_siege_core::{MatrixPosition, TaskId, TaskState, TickReport, TileGraph};
use tracing::{debug, trace};

use crate::{
    search::{SearchProgress, SearchState},
    task::{SharedSlot, TaskSlot},
};

pub use crate::task::{NavigatorTask, PathResult};

/// Offsets probed when a blocked goal needs a walkable stand-in.
const GOAL_NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Times an exhausted search is retried because the level changed under it.
const MAX_STALE_RESTARTS: u32 = 3;

/// Reasons a path request resolves without a route.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum NavigationError {
    /// The start or goal lies outside the level.
    #[error("path endpoint ({}, {}) lies outside the level", .position.x(), .position.y())]
    OutOfBounds {
        /// Offending endpoint.
        position: MatrixPosition,
    },
    /// No walkable route connects the start to the goal.
    #[error("no walkable route reaches the goal")]
    Unreachable,
    /// The navigator already holds its maximum number of pending tasks.
    #[error("navigator queue is full ({capacity} pending tasks)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
}

/// Ordered waypoints leading from a start cell (exclusive) to the goal
/// (inclusive).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    waypoints: Vec<MatrixPosition>,
}

impl Path {
    /// Wraps the provided waypoints.
    #[must_use]
    pub fn new(waypoints: Vec<MatrixPosition>) -> Self {
        Self { waypoints }
    }

    /// Waypoints in travel order.
    #[must_use]
    pub fn waypoints(&self) -> &[MatrixPosition] {
        &self.waypoints
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Reports whether the requester already stands on the goal.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Final waypoint, which is the effective goal.
    #[must_use]
    pub fn last(&self) -> Option<MatrixPosition> {
        self.waypoints.last().copied()
    }

    /// Consumes the path, yielding the waypoints.
    #[must_use]
    pub fn into_vec(self) -> Vec<MatrixPosition> {
        self.waypoints
    }
}

impl IntoIterator for Path {
    type Item = MatrixPosition;
    type IntoIter = std::vec::IntoIter<MatrixPosition>;

    fn into_iter(self) -> Self::IntoIter {
        self.waypoints.into_iter()
    }
}

/// Tuning knobs for the navigator scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Node expansions spent per tick across all tasks.
    pub expansions_per_tick: u32,
    /// Maximum number of queued or running tasks; further requests fail fast.
    pub max_queue_len: usize,
    /// Enables 8-connected movement without corner cutting.
    pub allow_diagonals: bool,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            expansions_per_tick: 1_500,
            max_queue_len: 64,
            allow_diagonals: false,
        }
    }
}

/// FIFO path-finding scheduler owned by the world context.
#[derive(Debug)]
pub struct Navigator {
    config: NavigatorConfig,
    queue: VecDeque<SharedSlot>,
    next_task_id: u64,
}

impl Navigator {
    /// Creates an idle navigator using the provided configuration.
    #[must_use]
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            next_task_id: 0,
        }
    }

    /// Configuration the navigator was created with.
    #[must_use]
    pub const fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Submits a request whose outcome is collected through
    /// [`NavigatorTask::poll`].
    pub fn create_task<G: TileGraph>(
        &mut self,
        graph: &G,
        start: MatrixPosition,
        goal: MatrixPosition,
    ) -> NavigatorTask {
        self.submit(graph, start, goal, None)
    }

    /// Submits a request whose outcome is delivered to `on_complete`.
    ///
    /// The callback runs synchronously, either inside this call when the
    /// request is rejected at the boundary or inside the [`Navigator::tick`]
    /// that resolves it. It runs at most once and never after
    /// [`NavigatorTask::cancel`] returned.
    pub fn create_task_with<G, F>(
        &mut self,
        graph: &G,
        start: MatrixPosition,
        goal: MatrixPosition,
        on_complete: F,
    ) -> NavigatorTask
    where
        G: TileGraph,
        F: FnOnce(PathResult) + 'static,
    {
        self.submit(graph, start, goal, Some(Box::new(on_complete)))
    }

    /// Spends up to the configured expansion budget on queued tasks.
    pub fn tick<G: TileGraph>(&mut self, graph: &G) -> TickReport {
        self.purge_settled();

        let mut report = TickReport::default();
        let mut budget = self.config.expansions_per_tick;

        while budget > 0 {
            let Some(slot) = self.queue.front().map(Rc::clone) else {
                break;
            };

            // Callbacks fired earlier in this tick may have cancelled it.
            if slot.borrow().state.is_terminal() {
                let _ = self.queue.pop_front();
                continue;
            }

            let before = budget;
            let outcome = self.step(&slot, graph, &mut budget);
            report.expansions += before - budget;

            let result = match outcome {
                Step::Pending => break,
                Step::Requeue => {
                    report.restarts += 1;
                    if let Some(slot) = self.queue.pop_front() {
                        self.queue.push_back(slot);
                    }
                    continue;
                }
                Step::Resolved(result) => result,
            };

            let _ = self.queue.pop_front();
            if result.is_ok() {
                report.resolved += 1;
            } else {
                report.failed += 1;
            }
            task::resolve(&slot, result);
        }

        report.pending = self.pending_len();
        trace!(
            expansions = report.expansions,
            resolved = report.resolved,
            failed = report.failed,
            restarts = report.restarts,
            pending = report.pending,
            "navigator tick"
        );
        report
    }

    /// Number of tasks still queued or running.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue
            .iter()
            .filter(|slot| !slot.borrow().state.is_terminal())
            .count()
    }

    /// Cancels every pending task without invoking callbacks.
    ///
    /// Returns the number of tasks that were withdrawn.
    pub fn clear(&mut self) -> usize {
        let mut cancelled = 0;
        for slot in self.queue.drain(..) {
            let task = NavigatorTask::from_slot(slot);
            if task.is_pending() {
                task.cancel();
                cancelled += 1;
            }
        }
        debug!(cancelled, "navigator cleared");
        cancelled
    }

    fn submit<G: TileGraph>(
        &mut self,
        graph: &G,
        start: MatrixPosition,
        goal: MatrixPosition,
        on_complete: Option<task::Completion>,
    ) -> NavigatorTask {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;

        let slot = Rc::new(RefCell::new(TaskSlot::new(id, start, goal, on_complete)));
        let handle = NavigatorTask::from_slot(Rc::clone(&slot));

        if let Err(error) = self.admit(graph, start, goal) {
            debug!(task = id.get(), %error, "path request rejected");
            task::resolve(&slot, Err(error));
            return handle;
        }

        debug!(
            task = id.get(),
            start = ?start,
            goal = ?goal,
            "path request queued"
        );
        self.queue.push_back(slot);
        handle
    }

    fn admit<G: TileGraph>(
        &mut self,
        graph: &G,
        start: MatrixPosition,
        goal: MatrixPosition,
    ) -> Result<(), NavigationError> {
        for position in [start, goal] {
            if !graph.contains(position) {
                return Err(NavigationError::OutOfBounds { position });
            }
        }

        if effective_goal(graph, start, goal).is_none() {
            return Err(NavigationError::Unreachable);
        }

        self.purge_settled();
        if self.queue.len() >= self.config.max_queue_len {
            return Err(NavigationError::QueueFull {
                capacity: self.config.max_queue_len,
            });
        }

        Ok(())
    }

    /// Advances the head task by at most `*budget` expansions.
    fn step<G: TileGraph>(&self, shared: &SharedSlot, graph: &G, budget: &mut u32) -> Step {
        let mut guard = shared.borrow_mut();
        let slot = &mut *guard;
        let revision = graph.revision();

        if let Some(search) = slot.search.as_mut() {
            if search.observe(revision) {
                match effective_goal(graph, slot.start, slot.requested_goal) {
                    None => return Step::Resolved(Err(NavigationError::Unreachable)),
                    Some(goal) if goal != search.goal() => {
                        debug!(
                            task = slot.id.get(),
                            ?goal,
                            "substituted goal moved, restarting search"
                        );
                        return restart(slot);
                    }
                    Some(_) => {}
                }
            }
        }

        if slot.search.is_none() {
            let Some(goal) = effective_goal(graph, slot.start, slot.requested_goal) else {
                return Step::Resolved(Err(NavigationError::Unreachable));
            };
            slot.search = Some(SearchState::new(
                graph,
                slot.start,
                goal,
                self.config.allow_diagonals,
            ));
            slot.state = TaskState::Running;
        }
        let Some(search) = slot.search.as_mut() else {
            return Step::Pending;
        };

        match search.advance(graph, budget) {
            SearchProgress::Pending => Step::Pending,
            SearchProgress::Found(waypoints) => {
                if !route_is_open(graph, slot.start, &waypoints) {
                    debug!(
                        task = slot.id.get(),
                        "route crosses a cell blocked since expansion, restarting search"
                    );
                    return restart(slot);
                }
                debug!(
                    task = slot.id.get(),
                    goal = ?search.goal(),
                    waypoints = waypoints.len(),
                    "path resolved"
                );
                Step::Resolved(Ok(Path::new(waypoints)))
            }
            SearchProgress::Exhausted => {
                if search.is_stale(revision) && slot.restarts < MAX_STALE_RESTARTS {
                    debug!(
                        task = slot.id.get(),
                        "level changed during exhausted search, restarting"
                    );
                    return restart(slot);
                }
                debug!(task = slot.id.get(), "no path found");
                Step::Resolved(Err(NavigationError::Unreachable))
            }
        }
    }

    fn purge_settled(&mut self) {
        self.queue.retain(|slot| !slot.borrow().state.is_terminal());
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        if self.pending_len() > 0 {
            let _ = self.clear();
        }
    }
}

/// Outcome of servicing the queue head for one slice.
enum Step {
    /// Budget ran out before the search finished.
    Pending,
    /// The search was discarded; the task goes to the back of the queue.
    Requeue,
    /// The task is done.
    Resolved(PathResult),
}

/// Drops the partial search so the task is reseeded on its next turn.
fn restart(slot: &mut TaskSlot) -> Step {
    slot.search = None;
    slot.restarts += 1;
    slot.state = TaskState::Queued;
    Step::Requeue
}

/// Reports whether every step of the route is still walkable.
///
/// Diagonal steps additionally need both orthogonal corners open.
fn route_is_open<G: TileGraph>(
    graph: &G,
    start: MatrixPosition,
    waypoints: &[MatrixPosition],
) -> bool {
    let mut previous = start;
    for &cell in waypoints {
        if !graph.is_walkable(cell) {
            return false;
        }
        if previous.x() != cell.x() && previous.y() != cell.y() {
            let corners = [
                MatrixPosition::new(cell.x(), previous.y()),
                MatrixPosition::new(previous.x(), cell.y()),
            ];
            if !corners.iter().all(|&corner| graph.is_walkable(corner)) {
                return false;
            }
        }
        previous = cell;
    }
    true
}

/// Resolves the cell a search should actually route toward.
///
/// A walkable goal is used as-is. Otherwise the walkable neighbour closest to
/// `start` (octile distance) is chosen, ties broken by lowest row and then
/// lowest column. The start cell itself qualifies as a neighbour even when it
/// is not walkable, since the requester already stands there.
fn effective_goal<G: TileGraph>(
    graph: &G,
    start: MatrixPosition,
    goal: MatrixPosition,
) -> Option<MatrixPosition> {
    if graph.is_walkable(goal) {
        return Some(goal);
    }

    let (width, height) = graph.dimensions();
    GOAL_NEIGHBOR_OFFSETS
        .iter()
        .filter_map(|&(dx, dy)| goal.offset(dx, dy, width, height))
        .filter(|&cell| cell == start || graph.is_walkable(cell))
        .min_by_key(|cell| (cell.octile_distance(start), cell.y(), cell.x()))
}
