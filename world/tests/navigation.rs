use std::{cell::RefCell, rc::Rc};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tower_siege_core::{
    BuildingKind, Command, EntityId, Event, MatrixPosition, MatrixRect, TaskId, Terrain,
};
use tower_siege_system_navigator::{NavigationError, NavigatorConfig, PathResult};
use tower_siege_world::{
    apply, generation::generate_level, navigation, query, Level, Projection, World,
};

type Outcomes = Rc<RefCell<Vec<(TaskId, PathResult)>>>;

fn flat_world(width: u32, height: u32, expansions_per_tick: u32) -> World {
    let level = Level::flat(width, height, Terrain::Grass, Projection::default());
    World::new(
        level,
        NavigatorConfig {
            expansions_per_tick,
            ..NavigatorConfig::default()
        },
    )
}

fn place_wall(world: &mut World, x: u32, y: u32) -> EntityId {
    let mut events = Vec::new();
    apply(
        world,
        Command::PlaceBuilding {
            kind: BuildingKind::Wall,
            origin: MatrixPosition::new(x, y),
        },
        &mut events,
    );
    match events.as_slice() {
        [Event::BuildingPlaced { building, .. }] => *building,
        other => panic!("wall placement at ({x}, {y}) failed: {other:?}"),
    }
}

fn request(world: &mut World, start: MatrixPosition, goal: MatrixPosition, outcomes: &Outcomes) -> TaskId {
    let (navigator, level) = navigation(world);
    let sink = Rc::clone(outcomes);
    let slot: Rc<RefCell<Option<TaskId>>> = Rc::default();
    let id_slot = Rc::clone(&slot);
    let task = navigator.create_task_with(level, start, goal, move |result| {
        let id = id_slot.borrow().unwrap_or(TaskId::new(u64::MAX));
        sink.borrow_mut().push((id, result));
    });
    *slot.borrow_mut() = Some(task.id());
    task.id()
}

fn tick_until_idle(world: &mut World, max_ticks: usize) -> usize {
    let mut events = Vec::new();
    for tick in 1..=max_ticks {
        apply(world, Command::Tick { dt_ms: 16 }, &mut events);
        if query::navigator(world).pending_len() == 0 {
            return tick;
        }
    }
    panic!("navigator still busy after {max_ticks} ticks");
}

fn is_adjacent(a: MatrixPosition, b: MatrixPosition) -> bool {
    a.manhattan_distance(b) == 1
}

fn assert_walkable_chain(level: &Level, start: MatrixPosition, waypoints: &[MatrixPosition]) {
    let mut previous = start;
    for &cell in waypoints {
        assert!(is_adjacent(previous, cell), "{previous:?} -> {cell:?} is not a single step");
        assert!(level.is_walkable(cell), "{cell:?} is not walkable");
        previous = cell;
    }
}

#[test]
fn every_cell_round_trips_through_world_space() {
    for projection in [
        Projection::default(),
        Projection::Orthogonal {
            tile_width: 24.0,
            tile_height: 16.0,
        },
    ] {
        let level = generate_level(30, 20, 11, projection);
        for cell in MatrixRect::new(MatrixPosition::new(0, 0), 30, 20).cells() {
            assert_eq!(level.to_matrix_position(level.to_world_position(cell)), Some(cell));
        }
    }
}

#[test]
fn buildings_toggle_walkability_of_every_cell() {
    let mut world = flat_world(5, 5, 100);
    for cell in MatrixRect::new(MatrixPosition::new(0, 0), 5, 5).cells() {
        let building = place_wall(&mut world, cell.x(), cell.y());
        assert!(!query::level(&world).is_walkable(cell));

        let mut events = Vec::new();
        apply(&mut world, Command::RemoveBuilding { building }, &mut events);
        assert!(query::level(&world).is_walkable(cell));
    }
}

#[test]
fn open_level_resolves_path_to_goal() {
    let mut world = flat_world(8, 8, 1_500);
    let outcomes = Outcomes::default();
    let start = MatrixPosition::new(0, 0);
    let goal = MatrixPosition::new(5, 5);
    let _ = request(&mut world, start, goal, &outcomes);

    let _ = tick_until_idle(&mut world, 4);

    let outcomes = outcomes.borrow();
    let [(_, Ok(path))] = outcomes.as_slice() else {
        panic!("expected a single resolved path, got {outcomes:?}");
    };
    assert_eq!(path.waypoints().first().map(|cell| is_adjacent(start, *cell)), Some(true));
    assert_eq!(path.last(), Some(goal));
    assert_walkable_chain(query::level(&world), start, path.waypoints());
}

#[test]
fn goal_enclosed_by_buildings_fails_immediately() {
    let mut world = flat_world(7, 7, 1_500);
    let goal = MatrixPosition::new(3, 3);
    let _ = place_wall(&mut world, 3, 3);
    for cell in MatrixRect::new(MatrixPosition::new(2, 2), 3, 3).cells() {
        if cell != goal {
            let _ = place_wall(&mut world, cell.x(), cell.y());
        }
    }

    let outcomes = Outcomes::default();
    let _ = request(&mut world, MatrixPosition::new(0, 0), goal, &outcomes);

    assert!(matches!(
        outcomes.borrow().as_slice(),
        [(_, Err(NavigationError::Unreachable))]
    ));
    assert_eq!(query::navigator(&world).pending_len(), 0);
}

#[test]
fn building_on_only_corridor_before_service_fails_request() {
    let mut world = flat_world(9, 5, 1_500);
    for y in [0, 1, 3, 4] {
        let _ = place_wall(&mut world, 4, y);
    }
    let outcomes = Outcomes::default();
    let _ = request(
        &mut world,
        MatrixPosition::new(0, 2),
        MatrixPosition::new(8, 2),
        &outcomes,
    );

    let _ = place_wall(&mut world, 4, 2);
    let _ = tick_until_idle(&mut world, 4);

    assert!(matches!(
        outcomes.borrow().as_slice(),
        [(_, Err(NavigationError::Unreachable))]
    ));
}

#[test]
fn building_on_one_of_two_corridors_reroutes_through_the_other() {
    let mut world = flat_world(9, 5, 1_500);
    for y in [0, 2, 4] {
        let _ = place_wall(&mut world, 4, y);
    }
    let start = MatrixPosition::new(0, 1);
    let outcomes = Outcomes::default();
    let _ = request(&mut world, start, MatrixPosition::new(8, 1), &outcomes);

    let blocked = MatrixPosition::new(4, 1);
    let _ = place_wall(&mut world, blocked.x(), blocked.y());
    let _ = tick_until_idle(&mut world, 4);

    let outcomes = outcomes.borrow();
    let [(_, Ok(path))] = outcomes.as_slice() else {
        panic!("expected a resolved path, got {outcomes:?}");
    };
    assert!(!path.waypoints().contains(&blocked));
    assert!(path.waypoints().contains(&MatrixPosition::new(4, 3)));
    assert_walkable_chain(query::level(&world), start, path.waypoints());
}

#[test]
fn building_placed_mid_search_is_never_crossed() {
    let mut world = flat_world(24, 5, 10);
    for y in [0, 1, 3, 4] {
        let _ = place_wall(&mut world, 12, y);
    }
    let outcomes = Outcomes::default();
    let _ = request(
        &mut world,
        MatrixPosition::new(0, 2),
        MatrixPosition::new(23, 2),
        &outcomes,
    );

    let mut events = Vec::new();
    apply(&mut world, Command::Tick { dt_ms: 16 }, &mut events);
    assert!(outcomes.borrow().is_empty());

    let gate = place_wall(&mut world, 12, 2);
    let _ = tick_until_idle(&mut world, 500);
    assert!(matches!(
        outcomes.borrow().as_slice(),
        [(_, Err(NavigationError::Unreachable))]
    ));

    apply(&mut world, Command::RemoveBuilding { building: gate }, &mut events);
    let _ = request(
        &mut world,
        MatrixPosition::new(0, 2),
        MatrixPosition::new(23, 2),
        &outcomes,
    );
    let _ = tick_until_idle(&mut world, 500);
    assert!(matches!(outcomes.borrow().last(), Some((_, Ok(_)))));
}

#[test]
fn requests_on_generated_level_resolve_in_creation_order() {
    const TASKS: usize = 40;
    const BUDGET: u32 = 500;

    let level = generate_level(48, 48, 2024, Projection::default());
    let walkable: Vec<MatrixPosition> = level.walkable_cells().collect();
    assert!(!walkable.is_empty());
    let mut world = World::new(
        level,
        NavigatorConfig {
            expansions_per_tick: BUDGET,
            ..NavigatorConfig::default()
        },
    );

    let mut rng = ChaCha8Rng::seed_from_u64(0xfeed);
    let outcomes = Outcomes::default();
    let mut requests = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let start = walkable[rng.gen_range(0..walkable.len())];
        let goal = walkable[rng.gen_range(0..walkable.len())];
        let id = request(&mut world, start, goal, &outcomes);
        requests.push((id, start, goal));
    }

    let cells = 48 * 48;
    let bound = TASKS * cells * 8 / BUDGET as usize + TASKS;
    let _ = tick_until_idle(&mut world, bound);

    let outcomes = outcomes.borrow();
    let resolved_order: Vec<TaskId> = outcomes.iter().map(|(id, _)| *id).collect();
    let created_order: Vec<TaskId> = requests.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(resolved_order, created_order);

    for ((_, result), (_, start, goal)) in outcomes.iter().zip(&requests) {
        match result {
            Ok(path) if start == goal => assert!(path.is_empty()),
            Ok(path) => {
                assert_eq!(path.last(), Some(*goal));
                assert_walkable_chain(query::level(&world), *start, path.waypoints());
            }
            Err(error) => assert_eq!(*error, NavigationError::Unreachable),
        }
    }
}
