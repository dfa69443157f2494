#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Path-following consumer that chases a moving target across a level.
//!
//! A [`Pursuer`] holds at most one outstanding [`NavigatorTask`]. It asks for
//! a fresh path only when it holds none, when its path ran out before the
//! target's cell was reached, or when the target drifted beyond the
//! configured breakpoint. Within the engage distance the pursuer stops
//! path-following altogether. Failed requests idle the pursuer and are
//! retried on a fixed tick interval. A calmed pursuer keeps its path but holds
//! its position until the calm runs out.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tower_siege_system_navigator::{Navigator, NavigatorTask};
use tower_siege_world::{Level, WorldPosition};
use tracing::{debug, warn};

/// Tuning knobs for path-following consumers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    /// World-space distance the target may drift before the path is recomputed.
    pub breakpoint: f32,
    /// Distance at which a waypoint counts as reached.
    pub arrival_epsilon: f32,
    /// Distance to the target below which no path is held.
    pub engage_distance: f32,
    /// Ticks to wait after a failed request before asking again.
    pub retry_interval_ticks: u64,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            breakpoint: 96.0,
            arrival_epsilon: 1.0,
            engage_distance: 24.0,
            retry_interval_ticks: 30,
        }
    }
}

/// Observable phase of a pursuer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PursuitState {
    /// No path held and no request outstanding.
    Idle,
    /// A path request is queued or running.
    Waiting,
    /// Consuming waypoints of a resolved path.
    Following,
    /// Every waypoint of the held path was reached.
    Arrived,
    /// The last request failed; waiting for the retry interval to elapse.
    Stalled,
    /// Close enough to the target that no path is needed.
    Engaged,
}

/// Consumer that turns navigator paths into movement.
#[derive(Debug)]
pub struct Pursuer {
    config: PursuitConfig,
    state: PursuitState,
    task: Option<NavigatorTask>,
    path: VecDeque<WorldPosition>,
    requested_target: Option<WorldPosition>,
    retry_at: Option<u64>,
    calm_until: Option<u64>,
    holding: bool,
}

impl Pursuer {
    /// Creates an idle pursuer.
    #[must_use]
    pub fn new(config: PursuitConfig) -> Self {
        Self {
            config,
            state: PursuitState::Idle,
            task: None,
            path: VecDeque::new(),
            requested_target: None,
            retry_at: None,
            calm_until: None,
            holding: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn state(&self) -> PursuitState {
        self.state
    }

    /// Outstanding path request, if any.
    #[must_use]
    pub const fn task(&self) -> Option<&NavigatorTask> {
        self.task.as_ref()
    }

    /// Number of waypoints left on the held path.
    #[must_use]
    pub fn remaining_waypoints(&self) -> usize {
        self.path.len()
    }

    /// Earliest tick at which a failed request is retried.
    #[must_use]
    pub const fn next_retry_tick(&self) -> Option<u64> {
        self.retry_at
    }

    /// Pauses pursuit until `until_tick`.
    ///
    /// The held path and any outstanding request are kept; [`Self::advance`]
    /// stands still while the calm lasts.
    pub fn calm(&mut self, until_tick: u64) {
        debug!(until_tick, "pursuit calmed");
        self.calm_until = Some(until_tick);
    }

    /// Reports whether pursuit is paused at `tick`.
    #[must_use]
    pub fn is_calm(&self, tick: u64) -> bool {
        self.calm_until.is_some_and(|until| tick < until)
    }

    /// Reports whether the ground tile under `position` has been revealed.
    ///
    /// Positions outside the level are never visible.
    #[must_use]
    pub fn is_visible(level: &Level, position: WorldPosition) -> bool {
        level
            .to_matrix_position(position)
            .is_some_and(|cell| level.is_visible(cell))
    }

    /// Collects resolved paths and requests a new one when needed.
    ///
    /// `tick` is the caller's monotonically increasing frame counter.
    pub fn update(
        &mut self,
        navigator: &mut Navigator,
        level: &Level,
        position: WorldPosition,
        target: WorldPosition,
        tick: u64,
    ) {
        self.collect(level, tick);

        self.holding = self.is_calm(tick);
        if self.holding {
            return;
        }
        self.calm_until = None;

        if position.distance(target) <= self.config.engage_distance {
            if self.state != PursuitState::Engaged {
                debug!(?position, ?target, "pursuit target within reach");
            }
            self.cancel();
            self.state = PursuitState::Engaged;
            return;
        }

        if !self.needs_path(level, target) {
            return;
        }
        if self.retry_at.is_some_and(|at| tick < at) {
            return;
        }

        self.request(navigator, level, position, target, tick);
        // Requests rejected at intake resolve synchronously.
        self.collect(level, tick);
    }

    /// Moves from `position` along the held path by at most `max_step`.
    ///
    /// Waypoints are consumed strictly in order. Returns the new position,
    /// which is `position` itself while the pursuer is calm.
    pub fn advance(&mut self, position: WorldPosition, max_step: f32) -> WorldPosition {
        if self.holding {
            return position;
        }
        let mut position = position;
        let mut remaining = max_step.max(0.0);

        while let Some(&waypoint) = self.path.front() {
            let offset = waypoint - position;
            let distance = offset.length();
            if distance <= self.config.arrival_epsilon {
                let _ = self.path.pop_front();
                continue;
            }
            if remaining <= 0.0 {
                break;
            }
            if distance <= remaining {
                position = waypoint;
                remaining -= distance;
                let _ = self.path.pop_front();
            } else {
                position += offset / distance * remaining;
                break;
            }
        }

        if self.path.is_empty() && self.state == PursuitState::Following {
            self.state = PursuitState::Arrived;
        }
        position
    }

    /// Drops the held path and withdraws any outstanding request.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        self.path.clear();
        self.requested_target = None;
        self.state = PursuitState::Idle;
    }

    fn needs_path(&self, level: &Level, target: WorldPosition) -> bool {
        let Some(requested) = self.requested_target else {
            return true;
        };
        if requested.distance(target) > self.config.breakpoint {
            return true;
        }
        self.task.is_none()
            && self.path.is_empty()
            && level.to_matrix_position(requested) != level.to_matrix_position(target)
    }

    fn request(
        &mut self,
        navigator: &mut Navigator,
        level: &Level,
        position: WorldPosition,
        target: WorldPosition,
        tick: u64,
    ) {
        self.cancel();

        let (Some(start), Some(goal)) = (
            level.to_matrix_position(position),
            level.to_matrix_position(target),
        ) else {
            warn!(?position, ?target, "pursuit endpoint lies outside the level");
            self.stall(tick);
            return;
        };

        let task = navigator.create_task(level, start, goal);
        debug!(task = task.id().get(), ?start, ?goal, "pursuit path requested");
        self.task = Some(task);
        self.requested_target = Some(target);
        self.state = PursuitState::Waiting;
    }

    fn collect(&mut self, level: &Level, tick: u64) {
        let Some(task) = self.task.as_ref() else {
            return;
        };
        let Some(result) = task.poll() else {
            if !task.is_pending() {
                // Withdrawn elsewhere, e.g. by a navigator teardown.
                self.task = None;
                self.requested_target = None;
                self.state = PursuitState::Idle;
            }
            return;
        };
        self.task = None;

        match result {
            Ok(path) => {
                self.path = path
                    .waypoints()
                    .iter()
                    .map(|cell| level.to_world_position(*cell))
                    .collect();
                self.retry_at = None;
                self.state = if self.path.is_empty() {
                    PursuitState::Arrived
                } else {
                    PursuitState::Following
                };
            }
            Err(error) => {
                warn!(%error, retry_in = self.config.retry_interval_ticks, "pursuit target unreachable");
                self.stall(tick);
            }
        }
    }

    fn stall(&mut self, tick: u64) {
        self.path.clear();
        self.requested_target = None;
        self.retry_at = Some(tick.saturating_add(self.config.retry_interval_ticks));
        self.state = PursuitState::Stalled;
    }
}

impl Drop for Pursuer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}
