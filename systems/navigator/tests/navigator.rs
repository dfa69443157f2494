use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tower_siege_core::{MatrixPosition, TaskState, TileGraph};
use tower_siege_system_navigator::{
    NavigationError, Navigator, NavigatorConfig, NavigatorTask, PathResult,
};

struct TestGrid {
    width: u32,
    height: u32,
    walls: HashSet<MatrixPosition>,
    revision: u64,
}

impl TestGrid {
    fn open(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            walls: HashSet::new(),
            revision: 0,
        }
    }

    fn block(&mut self, x: u32, y: u32) {
        let _ = self.walls.insert(MatrixPosition::new(x, y));
        self.revision += 1;
    }

    fn unblock(&mut self, x: u32, y: u32) {
        let _ = self.walls.remove(&MatrixPosition::new(x, y));
        self.revision += 1;
    }

    /// Records a level change that leaves walkability untouched.
    fn touch(&mut self) {
        self.revision += 1;
    }
}

impl TileGraph for TestGrid {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_walkable(&self, cell: MatrixPosition) -> bool {
        self.contains(cell) && !self.walls.contains(&cell)
    }

    fn traversal_cost(&self, cell: MatrixPosition) -> Option<u32> {
        self.is_walkable(cell).then_some(1)
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// 7x3 grid whose middle row is the only corridor between the two halves.
fn corridor_grid() -> TestGrid {
    let mut grid = TestGrid::open(7, 3);
    for y in [0, 2] {
        grid.block(3, y);
    }
    grid
}

fn navigator(expansions_per_tick: u32) -> Navigator {
    Navigator::new(NavigatorConfig {
        expansions_per_tick,
        ..NavigatorConfig::default()
    })
}

fn drain(navigator: &mut Navigator, grid: &TestGrid, max_ticks: usize) -> usize {
    for tick in 1..=max_ticks {
        let _ = navigator.tick(grid);
        if navigator.pending_len() == 0 {
            return tick;
        }
    }
    panic!("navigator still busy after {max_ticks} ticks");
}

fn is_adjacent(a: MatrixPosition, b: MatrixPosition) -> bool {
    a.manhattan_distance(b) == 1
}

#[test]
fn open_grid_resolves_path_to_goal() {
    let grid = TestGrid::open(8, 8);
    let mut navigator = navigator(1_000);
    let start = MatrixPosition::new(0, 0);
    let goal = MatrixPosition::new(5, 5);

    let task = navigator.create_task(&grid, start, goal);
    assert_eq!(task.state(), TaskState::Queued);
    let _ = drain(&mut navigator, &grid, 1);

    assert_eq!(task.state(), TaskState::Resolved);
    let path = task.poll().expect("outcome available").expect("path found");
    assert_eq!(path.len(), 10);
    let waypoints = path.waypoints();
    assert!(is_adjacent(start, waypoints[0]));
    assert_eq!(path.last(), Some(goal));
    for pair in waypoints.windows(2) {
        assert!(is_adjacent(pair[0], pair[1]));
    }
    assert!(task.poll().is_none(), "outcome is handed out once");
}

#[test]
fn enclosed_goal_fails_without_queueing() {
    let mut grid = TestGrid::open(7, 7);
    for x in 2..=4 {
        for y in 2..=4 {
            grid.block(x, y);
        }
    }
    let mut navigator = navigator(1_000);
    let outcome: Rc<RefCell<Option<PathResult>>> = Rc::default();
    let sink = Rc::clone(&outcome);

    let task = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(3, 3),
        move |result| *sink.borrow_mut() = Some(result),
    );

    assert_eq!(task.state(), TaskState::Resolved);
    assert_eq!(*outcome.borrow(), Some(Err(NavigationError::Unreachable)));
    assert_eq!(navigator.pending_len(), 0);
}

#[test]
fn blocked_goal_routes_to_adjacent_cell() {
    let mut grid = TestGrid::open(6, 6);
    grid.block(4, 4);
    let mut navigator = navigator(1_000);

    let task = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(4, 4));
    let _ = drain(&mut navigator, &grid, 1);

    let path = task.poll().expect("resolved").expect("path found");
    let last = path.last().expect("non-empty path");
    assert_eq!(last.chebyshev_distance(MatrixPosition::new(4, 4)), 1);
    assert!(!path.waypoints().contains(&MatrixPosition::new(4, 4)));
}

#[test]
fn out_of_bounds_endpoints_fail_fast() {
    let grid = TestGrid::open(4, 4);
    let mut navigator = navigator(1_000);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let outside = MatrixPosition::new(4, 1);

    let task = navigator.create_task_with(&grid, MatrixPosition::new(0, 0), outside, move |result| {
        assert_eq!(
            result,
            Err(NavigationError::OutOfBounds { position: outside })
        );
        counter.set(counter.get() + 1);
    });

    assert_eq!(calls.get(), 1);
    assert_eq!(task.state(), TaskState::Resolved);
    assert_eq!(navigator.pending_len(), 0);
}

#[test]
fn cancelled_before_service_never_calls_back() {
    let grid = TestGrid::open(10, 10);
    let mut navigator = navigator(1_000);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);

    let task = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(9, 9),
        move |_| counter.set(counter.get() + 1),
    );
    task.cancel();
    task.cancel();

    for _ in 0..5 {
        let _ = navigator.tick(&grid);
    }

    assert_eq!(calls.get(), 0);
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(task.poll().is_none());
    assert_eq!(navigator.pending_len(), 0);
}

#[test]
fn cancelling_running_task_drops_search_and_frees_queue() {
    let grid = TestGrid::open(30, 30);
    let mut navigator = navigator(10);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);

    let running = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(29, 29),
        move |_| counter.set(counter.get() + 1),
    );
    let follower = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(2, 0));

    let report = navigator.tick(&grid);
    assert_eq!(report.expansions, 10);
    assert_eq!(running.state(), TaskState::Running);
    assert_eq!(follower.state(), TaskState::Queued);

    running.cancel();
    let _ = drain(&mut navigator, &grid, 5);

    assert_eq!(calls.get(), 0);
    assert_eq!(running.state(), TaskState::Cancelled);
    assert_eq!(follower.state(), TaskState::Resolved);
}

#[test]
fn cancel_after_resolution_is_a_no_op() {
    let grid = TestGrid::open(5, 5);
    let mut navigator = navigator(1_000);

    let task = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(2, 2));
    let _ = drain(&mut navigator, &grid, 1);
    task.cancel();
    task.cancel();

    assert_eq!(task.state(), TaskState::Resolved);
    assert!(task.poll().expect("outcome retained").is_ok());
}

#[test]
fn corridor_blocked_before_service_yields_failure() {
    let mut grid = corridor_grid();
    let mut navigator = navigator(1_000);

    let task = navigator.create_task(&grid, MatrixPosition::new(0, 1), MatrixPosition::new(6, 1));
    grid.block(3, 1);
    let _ = drain(&mut navigator, &grid, 2);

    assert_eq!(task.poll(), Some(Err(NavigationError::Unreachable)));
}

#[test]
fn corridor_blocked_mid_search_never_crosses_obstacle() {
    let mut grid = TestGrid::open(9, 9);
    // Vertical wall at x = 4 with gaps at y = 1 and y = 7.
    for y in 0..9 {
        if y != 1 && y != 7 {
            grid.block(4, y);
        }
    }
    let mut navigator = navigator(4);
    let task = navigator.create_task(&grid, MatrixPosition::new(0, 1), MatrixPosition::new(8, 1));

    let _ = navigator.tick(&grid);
    assert_eq!(task.state(), TaskState::Running);

    grid.block(4, 1);
    let _ = drain(&mut navigator, &grid, 200);

    let path = task.poll().expect("resolved").expect("alternate corridor used");
    assert!(!path.waypoints().contains(&MatrixPosition::new(4, 1)));
    assert!(path.waypoints().contains(&MatrixPosition::new(4, 7)));
}

#[test]
fn removed_obstacle_opens_route_for_running_task() {
    let mut grid = corridor_grid();
    grid.block(3, 1);
    let mut navigator = navigator(2);
    let task = navigator.create_task(&grid, MatrixPosition::new(0, 1), MatrixPosition::new(6, 1));

    let _ = navigator.tick(&grid);
    assert_eq!(task.state(), TaskState::Running);

    grid.unblock(3, 1);
    let _ = drain(&mut navigator, &grid, 50);

    let path = task.poll().expect("resolved").expect("path through reopened corridor");
    assert!(path.waypoints().contains(&MatrixPosition::new(3, 1)));
}

#[test]
fn queued_tasks_resolve_in_creation_order_without_starvation() {
    let grid = TestGrid::open(20, 20);
    let budget = 50;
    let mut navigator = Navigator::new(NavigatorConfig {
        expansions_per_tick: budget,
        max_queue_len: 64,
        allow_diagonals: false,
    });
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_cafe);

    let task_count = 24;
    let mut tasks = Vec::new();
    for index in 0..task_count {
        let start = MatrixPosition::new(rng.gen_range(0..20), rng.gen_range(0..20));
        let goal = MatrixPosition::new(rng.gen_range(0..20), rng.gen_range(0..20));
        let sink = Rc::clone(&order);
        tasks.push(navigator.create_task_with(&grid, start, goal, move |result| {
            assert!(result.is_ok());
            sink.borrow_mut().push(index);
        }));
    }

    // Each search pops at most four entries per cell.
    let per_task_ticks = (20 * 20 * 4) / budget as usize + 1;
    let ticks = drain(&mut navigator, &grid, task_count * per_task_ticks);

    assert!(ticks <= task_count * per_task_ticks);
    assert_eq!(*order.borrow(), (0..task_count).collect::<Vec<_>>());
    assert!(tasks.iter().all(|task| task.state() == TaskState::Resolved));
}

#[test]
fn tick_never_exceeds_budget() {
    let grid = TestGrid::open(25, 25);
    let mut navigator = navigator(17);
    for _ in 0..6 {
        let _ = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(24, 24));
    }

    while navigator.pending_len() > 0 {
        let report = navigator.tick(&grid);
        assert!(report.expansions <= 17);
    }
}

#[test]
fn full_queue_rejects_new_requests() {
    let grid = TestGrid::open(10, 10);
    let mut navigator = Navigator::new(NavigatorConfig {
        expansions_per_tick: 1,
        max_queue_len: 2,
        allow_diagonals: false,
    });

    let first = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(9, 9));
    let _second = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(9, 8));
    let rejected = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(9, 7));

    assert_eq!(
        rejected.poll(),
        Some(Err(NavigationError::QueueFull { capacity: 2 }))
    );

    first.cancel();
    let accepted = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(9, 7));
    assert_eq!(accepted.state(), TaskState::Queued);
}

#[test]
fn clear_cancels_everything_without_callbacks() {
    let grid = TestGrid::open(10, 10);
    let mut navigator = navigator(3);
    let calls = Rc::new(Cell::new(0));

    let tasks: Vec<_> = (0..4)
        .map(|offset| {
            let counter = Rc::clone(&calls);
            navigator.create_task_with(
                &grid,
                MatrixPosition::new(0, 0),
                MatrixPosition::new(9, offset),
                move |_| counter.set(counter.get() + 1),
            )
        })
        .collect();
    let _ = navigator.tick(&grid);

    assert_eq!(navigator.clear(), 4);
    let _ = navigator.tick(&grid);

    assert_eq!(calls.get(), 0);
    assert!(tasks.iter().all(|task| task.state() == TaskState::Cancelled));
}

#[test]
fn callback_may_cancel_queued_sibling() {
    let grid = TestGrid::open(6, 6);
    let mut navigator = navigator(1_000);
    let sibling_calls = Rc::new(Cell::new(0));

    let sibling_slot: Rc<RefCell<Option<NavigatorTask>>> = Rc::default();
    let sibling_handle = Rc::clone(&sibling_slot);
    let _first = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(1, 0),
        move |_| {
            if let Some(task) = sibling_handle.borrow().as_ref() {
                task.cancel();
            }
        },
    );
    let counter = Rc::clone(&sibling_calls);
    let sibling = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(5, 5),
        move |_| counter.set(counter.get() + 1),
    );
    *sibling_slot.borrow_mut() = Some(sibling.clone());

    let _ = drain(&mut navigator, &grid, 1);

    assert_eq!(sibling_calls.get(), 0);
    assert_eq!(sibling.state(), TaskState::Cancelled);
}

#[test]
fn level_changing_every_tick_does_not_stall_the_queue() {
    let mut grid = TestGrid::open(40, 40);
    for y in 0..39 {
        grid.block(20, y);
    }
    let mut navigator = navigator(200);
    let order = Rc::new(RefCell::new(Vec::new()));
    let start = MatrixPosition::new(0, 0);

    let head_sink = Rc::clone(&order);
    let head = navigator.create_task_with(&grid, start, MatrixPosition::new(39, 0), move |result| {
        assert!(result.is_ok());
        head_sink.borrow_mut().push("head");
    });
    let behind_sink = Rc::clone(&order);
    let behind = navigator.create_task_with(&grid, start, MatrixPosition::new(1, 0), move |result| {
        assert!(result.is_ok());
        behind_sink.borrow_mut().push("behind");
    });

    for _ in 0..100 {
        if navigator.pending_len() == 0 {
            break;
        }
        let report = navigator.tick(&grid);
        assert_eq!(report.restarts, 0);
        grid.touch();
    }

    assert_eq!(head.state(), TaskState::Resolved);
    assert_eq!(behind.state(), TaskState::Resolved);
    assert_eq!(*order.borrow(), vec!["head", "behind"]);
}

#[test]
fn route_blocked_behind_the_search_front_is_searched_again() {
    let mut grid = TestGrid::open(9, 9);
    for y in 0..9 {
        if y != 1 && y != 7 {
            grid.block(4, y);
        }
    }
    let mut navigator = navigator(4);
    let start = MatrixPosition::new(0, 1);
    let task = navigator.create_task(&grid, start, MatrixPosition::new(8, 1));

    // Two slices carry the search through the upper gap before it closes.
    let _ = navigator.tick(&grid);
    let _ = navigator.tick(&grid);
    let closed = MatrixPosition::new(3, 1);
    grid.block(closed.x(), closed.y());

    let mut restarts = 0;
    for _ in 0..200 {
        if navigator.pending_len() == 0 {
            break;
        }
        restarts += navigator.tick(&grid).restarts;
    }

    let path = task.poll().expect("resolved").expect("lower gap used");
    assert!(restarts >= 1);
    assert!(!path.waypoints().contains(&closed));
    assert!(path.waypoints().contains(&MatrixPosition::new(4, 7)));
    let mut previous = start;
    for &cell in path.waypoints() {
        assert!(grid.is_walkable(cell));
        assert!(is_adjacent(previous, cell));
        previous = cell;
    }
}

#[test]
fn dropping_navigator_cancels_pending_tasks() {
    let grid = TestGrid::open(8, 8);
    let mut navigator = navigator(1);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let running = navigator.create_task_with(
        &grid,
        MatrixPosition::new(0, 0),
        MatrixPosition::new(7, 7),
        move |_| counter.set(counter.get() + 1),
    );
    let queued = navigator.create_task(&grid, MatrixPosition::new(0, 0), MatrixPosition::new(3, 3));
    let _ = navigator.tick(&grid);
    assert_eq!(running.state(), TaskState::Running);

    drop(navigator);

    assert_eq!(running.state(), TaskState::Cancelled);
    assert_eq!(queued.state(), TaskState::Cancelled);
    assert!(queued.poll().is_none());
    assert_eq!(calls.get(), 0);
}
