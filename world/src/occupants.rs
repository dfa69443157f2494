//! Registry of buildings and crystals standing on the occupant layer.

use std::collections::BTreeMap;

use tower_siege_core::{BuildingKind, EntityId, MatrixPosition, MatrixRect};

/// Snapshot of a building stored inside the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildingState {
    /// Identifier allocated by the world for the building.
    pub id: EntityId,
    /// Kind of building that was constructed.
    pub kind: BuildingKind,
    /// Region of cells occupied by the building.
    pub region: MatrixRect,
}

/// Snapshot of a crystal stored inside the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrystalState {
    /// Identifier allocated by the world for the crystal.
    pub id: EntityId,
    /// Cell holding the crystal.
    pub cell: MatrixPosition,
}

/// Registry that stores occupants and manages identifier allocation.
///
/// Buildings and crystals draw from one identifier sequence so an
/// [`EntityId`] names a single occupant for the lifetime of the world.
#[derive(Debug)]
pub(crate) struct OccupantRegistry {
    buildings: BTreeMap<EntityId, BuildingState>,
    crystals: BTreeMap<EntityId, CrystalState>,
    next_entity_id: u32,
}

impl OccupantRegistry {
    /// Creates an empty registry with a reset identifier counter.
    pub(crate) fn new() -> Self {
        Self {
            buildings: BTreeMap::new(),
            crystals: BTreeMap::new(),
            next_entity_id: 1,
        }
    }

    /// Reserves the next free identifier.
    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.next_entity_id = self.next_entity_id.wrapping_add(1);
        id
    }

    pub(crate) fn insert_building(&mut self, state: BuildingState) {
        let _ = self.buildings.insert(state.id, state);
    }

    pub(crate) fn remove_building(&mut self, id: EntityId) -> Option<BuildingState> {
        self.buildings.remove(&id)
    }

    pub(crate) fn insert_crystal(&mut self, state: CrystalState) {
        let _ = self.crystals.insert(state.id, state);
    }

    pub(crate) fn remove_crystal(&mut self, id: EntityId) -> Option<CrystalState> {
        self.crystals.remove(&id)
    }

    /// Iterates buildings in identifier order.
    pub(crate) fn buildings(&self) -> impl Iterator<Item = &BuildingState> {
        self.buildings.values()
    }

    /// Iterates crystals in identifier order.
    pub(crate) fn crystals(&self) -> impl Iterator<Item = &CrystalState> {
        self.crystals.values()
    }
}
