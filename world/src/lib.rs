#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state for Tower Siege.
//!
//! The world owns the [`Level`] grid, the occupants standing on it and the
//! [`Navigator`] that plans paths across it. All mutation flows through
//! [`apply`], which reports its effects as [`Event`]s.

pub mod config;
pub mod generation;
pub mod level;
mod occupants;
pub mod tile_matrix;

use tower_siege_core::{
    BuildingKind, Command, EntityId, Event, MatrixPosition, PlacementError, RemovalError, Tile,
    TileKind, OCCUPANT_LAYER,
};
use tower_siege_system_navigator::{Navigator, NavigatorConfig};
use tracing::debug;

pub use config::{ConfigError, LevelConfig, WorldConfig};
pub use level::{Level, Projection, WorldPosition};
pub use occupants::{BuildingState, CrystalState};
pub use tile_matrix::{TileError, TileMatrix};

use occupants::OccupantRegistry;

/// Represents the authoritative Tower Siege world state.
#[derive(Debug)]
pub struct World {
    level: Level,
    navigator: Navigator,
    occupants: OccupantRegistry,
    elapsed_ms: u64,
}

impl World {
    /// Wraps an existing level with an idle navigator.
    #[must_use]
    pub fn new(level: Level, navigator: NavigatorConfig) -> Self {
        Self {
            level,
            navigator: Navigator::new(navigator),
            occupants: OccupantRegistry::new(),
            elapsed_ms: 0,
        }
    }

    /// Generates the level described by `config`.
    #[must_use]
    pub fn from_config(config: &WorldConfig) -> Self {
        let level = generation::generate_level(
            config.level.width,
            config.level.height,
            config.level.seed,
            config.level.projection,
        );
        Self::new(level, config.navigator)
    }

    fn place_building(&mut self, kind: BuildingKind, origin: MatrixPosition, out_events: &mut Vec<Event>) {
        let region = kind.footprint(origin);
        if let Err(reason) = self.level.check_footprint(region) {
            debug!(?kind, x = origin.x(), y = origin.y(), ?reason, "building placement rejected");
            out_events.push(Event::BuildingPlacementRejected { kind, origin, reason });
            return;
        }

        let building = self.occupants.allocate();
        for cell in region.cells() {
            let tile = Tile::new(TileKind::Building(building));
            let _ = self.level.put_tile(tile, cell.at_layer(OCCUPANT_LAYER));
        }
        self.occupants.insert_building(BuildingState {
            id: building,
            kind,
            region,
        });
        out_events.push(Event::BuildingPlaced {
            building,
            kind,
            region,
        });
    }

    fn remove_building(&mut self, building: EntityId, out_events: &mut Vec<Event>) {
        let Some(state) = self.occupants.remove_building(building) else {
            out_events.push(Event::BuildingRemovalRejected {
                building,
                reason: RemovalError::MissingEntity,
            });
            return;
        };

        for cell in state.region.cells() {
            let _ = self.level.remove_tile(cell.at_layer(OCCUPANT_LAYER));
        }
        out_events.push(Event::BuildingRemoved {
            building,
            region: state.region,
        });
    }

    fn place_crystal(&mut self, cell: MatrixPosition, out_events: &mut Vec<Event>) {
        if let Err(reason) = self.check_crystal_cell(cell) {
            out_events.push(Event::CrystalPlacementRejected { cell, reason });
            return;
        }

        let crystal = self.occupants.allocate();
        let tile = Tile::new(TileKind::Crystal(crystal));
        let _ = self.level.put_tile(tile, cell.at_layer(OCCUPANT_LAYER));
        self.occupants.insert_crystal(CrystalState { id: crystal, cell });
        out_events.push(Event::CrystalPlaced { crystal, cell });
    }

    fn check_crystal_cell(&self, cell: MatrixPosition) -> Result<(), PlacementError> {
        if !self.level.matrix().contains(cell) {
            return Err(PlacementError::OutOfBounds);
        }
        if self.level.get_tile(cell.at_layer(OCCUPANT_LAYER)).is_some() {
            return Err(PlacementError::Occupied);
        }
        if !self.level.is_walkable(cell) {
            return Err(PlacementError::Unbuildable);
        }
        Ok(())
    }

    fn remove_crystal(&mut self, crystal: EntityId, out_events: &mut Vec<Event>) {
        let Some(state) = self.occupants.remove_crystal(crystal) else {
            out_events.push(Event::CrystalRemovalRejected {
                crystal,
                reason: RemovalError::MissingEntity,
            });
            return;
        };

        let _ = self.level.remove_tile(state.cell.at_layer(OCCUPANT_LAYER));
        out_events.push(Event::CrystalRemoved {
            crystal,
            cell: state.cell,
        });
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::PlaceBuilding { kind, origin } => world.place_building(kind, origin, out_events),
        Command::RemoveBuilding { building } => world.remove_building(building, out_events),
        Command::PlaceCrystal { cell } => world.place_crystal(cell, out_events),
        Command::RemoveCrystal { crystal } => world.remove_crystal(crystal, out_events),
        Command::RevealArea { center, radius } => {
            let count = world.level.reveal(center, radius);
            out_events.push(Event::TilesRevealed { count });
        }
        Command::Tick { dt_ms } => {
            world.elapsed_ms = world.elapsed_ms.saturating_add(u64::from(dt_ms));
            out_events.push(Event::TimeAdvanced { dt_ms });

            let report = world.navigator.tick(&world.level);
            out_events.push(Event::NavigatorAdvanced { report });
        }
        Command::Teardown => {
            let cancelled = world.navigator.clear();
            out_events.push(Event::NavigatorCleared { cancelled });
        }
    }
}

/// Hands out the navigator together with the level it plans against.
///
/// Requests are submitted through the returned navigator; the level borrow
/// lets callers pass the current walkability surface alongside.
pub fn navigation(world: &mut World) -> (&mut Navigator, &Level) {
    (&mut world.navigator, &world.level)
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use tower_siege_system_navigator::Navigator;

    use super::{BuildingState, CrystalState, Level, World};

    /// Level grid owned by the world.
    #[must_use]
    pub fn level(world: &World) -> &Level {
        &world.level
    }

    /// Navigator owned by the world.
    #[must_use]
    pub fn navigator(world: &World) -> &Navigator {
        &world.navigator
    }

    /// Buildings currently standing, in identifier order.
    pub fn buildings(world: &World) -> impl Iterator<Item = &BuildingState> {
        world.occupants.buildings()
    }

    /// Crystals currently standing, in identifier order.
    pub fn crystals(world: &World) -> impl Iterator<Item = &CrystalState> {
        world.occupants.crystals()
    }

    /// Simulated milliseconds accumulated by tick commands.
    #[must_use]
    pub fn elapsed_ms(world: &World) -> u64 {
        world.elapsed_ms
    }
}
