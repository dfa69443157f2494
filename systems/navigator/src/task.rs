//! Shared task slots and the requester-facing [`NavigatorTask`] handle.

use std::{cell::RefCell, fmt, rc::Rc};

use tower_siege_core::{MatrixPosition, TaskId, TaskState};

use crate::{search::SearchState, NavigationError, Path};

/// Outcome delivered once a task resolves.
pub type PathResult = Result<Path, NavigationError>;

/// Callback fired synchronously when a task resolves.
pub(crate) type Completion = Box<dyn FnOnce(PathResult)>;

/// State shared between the navigator queue and the requester's handle.
pub(crate) struct TaskSlot {
    pub(crate) id: TaskId,
    pub(crate) state: TaskState,
    pub(crate) start: MatrixPosition,
    pub(crate) requested_goal: MatrixPosition,
    pub(crate) search: Option<SearchState>,
    pub(crate) restarts: u32,
    outcome: Option<PathResult>,
    on_complete: Option<Completion>,
}

impl TaskSlot {
    pub(crate) fn new(
        id: TaskId,
        start: MatrixPosition,
        goal: MatrixPosition,
        on_complete: Option<Completion>,
    ) -> Self {
        Self {
            id,
            state: TaskState::Queued,
            start,
            requested_goal: goal,
            search: None,
            restarts: 0,
            outcome: None,
            on_complete,
        }
    }
}

impl fmt::Debug for TaskSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSlot")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("start", &self.start)
            .field("requested_goal", &self.requested_goal)
            .field("searching", &self.search.is_some())
            .field("restarts", &self.restarts)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

pub(crate) type SharedSlot = Rc<RefCell<TaskSlot>>;

/// Moves the slot into [`TaskState::Resolved`] and delivers `result`.
///
/// The slot borrow is released before the callback runs so the callback may
/// freely inspect or cancel its own handle.
pub(crate) fn resolve(slot: &SharedSlot, result: PathResult) {
    let callback = {
        let mut slot = slot.borrow_mut();
        if slot.state.is_terminal() {
            return;
        }
        slot.state = TaskState::Resolved;
        slot.search = None;
        match slot.on_complete.take() {
            Some(callback) => callback,
            None => {
                slot.outcome = Some(result);
                return;
            }
        }
    };
    callback(result);
}

/// Requester-side handle for a single path request.
///
/// Cloning the handle shares the same request. Cancelling through any clone
/// guarantees that the completion callback is never invoked afterwards.
#[derive(Clone)]
pub struct NavigatorTask {
    slot: SharedSlot,
}

impl NavigatorTask {
    pub(crate) fn from_slot(slot: SharedSlot) -> Self {
        Self { slot }
    }

    /// Identifier allocated by the navigator.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.slot.borrow().id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.slot.borrow().state
    }

    /// Reports whether the task is still queued or running.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Start cell supplied with the request.
    #[must_use]
    pub fn start(&self) -> MatrixPosition {
        self.slot.borrow().start
    }

    /// Goal cell supplied with the request, before any substitution.
    #[must_use]
    pub fn goal(&self) -> MatrixPosition {
        self.slot.borrow().requested_goal
    }

    /// Takes the outcome of a resolved task created without a callback.
    ///
    /// Returns `None` while the task is pending, after it was cancelled, and
    /// on every call after the first successful one.
    pub fn poll(&self) -> Option<PathResult> {
        self.slot.borrow_mut().outcome.take()
    }

    /// Withdraws the request.
    ///
    /// Queued and running tasks drop their partial search immediately and
    /// will never deliver an outcome. Cancelling a resolved or already
    /// cancelled task does nothing.
    pub fn cancel(&self) {
        let callback = {
            let mut slot = self.slot.borrow_mut();
            if slot.state.is_terminal() {
                return;
            }
            slot.state = TaskState::Cancelled;
            slot.search = None;
            slot.outcome = None;
            slot.on_complete.take()
        };
        // Released outside the borrow; captures may reach back into the slot.
        drop(callback);
    }
}

impl fmt::Debug for NavigatorTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NavigatorTask").field(&*self.slot.borrow()).finish()
    }
}
