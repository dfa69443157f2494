#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Tower Siege navigation engine.
//!
//! This crate defines the vocabulary that connects the authoritative world,
//! the navigator scheduler, and the movement consumers. Adapters submit
//! [`Command`] values describing desired level mutations, the world executes
//! them through its `apply` entry point, and then broadcasts [`Event`] values.
//! Path searches observe the level exclusively through the [`TileGraph`]
//! trait so they never hold a stale snapshot of occupancy.

use serde::{Deserialize, Serialize};

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixPosition {
    x: u32,
    y: u32,
}

impl MatrixPosition {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Lifts the cell onto the provided layer.
    #[must_use]
    pub const fn at_layer(self, z: u8) -> TilePosition {
        TilePosition::new(self, z)
    }

    /// Computes the Manhattan distance between two cells.
    #[must_use]
    pub fn manhattan_distance(self, other: MatrixPosition) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Computes the Chebyshev (king move) distance between two cells.
    #[must_use]
    pub fn chebyshev_distance(self, other: MatrixPosition) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Computes the octile distance scaled so that an orthogonal step costs
    /// [`ORTHOGONAL_STEP`] and a diagonal step costs [`DIAGONAL_STEP`].
    #[must_use]
    pub fn octile_distance(self, other: MatrixPosition) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let (low, high) = if dx < dy { (dx, dy) } else { (dy, dx) };
        DIAGONAL_STEP * low + ORTHOGONAL_STEP * (high - low)
    }

    /// Returns the cell displaced by the provided offset when it stays inside
    /// a `width` by `height` grid.
    #[must_use]
    pub fn offset(self, dx: i32, dy: i32, width: u32, height: u32) -> Option<Self> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        (x < width && y < height).then_some(Self { x, y })
    }
}

/// Cost of an orthogonal step before terrain weighting.
pub const ORTHOGONAL_STEP: u32 = 10;

/// Cost of a diagonal step before terrain weighting.
pub const DIAGONAL_STEP: u32 = 14;

/// Cell coordinate together with the layer that stores a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePosition {
    cell: MatrixPosition,
    z: u8,
}

impl TilePosition {
    /// Creates a new layered tile coordinate.
    #[must_use]
    pub const fn new(cell: MatrixPosition, z: u8) -> Self {
        Self { cell, z }
    }

    /// Grid cell addressed by the position.
    #[must_use]
    pub const fn cell(&self) -> MatrixPosition {
        self.cell
    }

    /// Layer index; zero is the ground layer.
    #[must_use]
    pub const fn z(&self) -> u8 {
        self.z
    }
}

/// Layer that holds the terrain tiles generated with the level.
pub const GROUND_LAYER: u8 = 0;

/// Layer that holds buildings, crystals and scenery.
pub const OCCUPANT_LAYER: u8 = 1;

/// Axis-aligned rectangle expressed in cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixRect {
    origin: MatrixPosition,
    width: u32,
    height: u32,
}

impl MatrixRect {
    /// Constructs a rectangle from its upper-left cell and dimensions.
    #[must_use]
    pub const fn new(origin: MatrixPosition, width: u32, height: u32) -> Self {
        Self {
            origin,
            width,
            height,
        }
    }

    /// Upper-left cell that anchors the rectangle.
    #[must_use]
    pub const fn origin(&self) -> MatrixPosition {
        self.origin
    }

    /// Width of the rectangle in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the rectangle in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Reports whether the rectangle covers the provided cell.
    #[must_use]
    pub fn contains(&self, cell: MatrixPosition) -> bool {
        cell.x() >= self.origin.x()
            && cell.y() >= self.origin.y()
            && cell.x() - self.origin.x() < self.width
            && cell.y() - self.origin.y() < self.height
    }

    /// Iterates the covered cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = MatrixPosition> {
        let origin = self.origin;
        let width = self.width;
        (0..self.height).flat_map(move |dy| {
            (0..width).filter_map(move |dx| {
                Some(MatrixPosition::new(
                    origin.x().checked_add(dx)?,
                    origin.y().checked_add(dy)?,
                ))
            })
        })
    }
}

/// Ground biome assigned to a cell when the level is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    /// Open sea; never walkable.
    DeepWater,
    /// Shallow water; never walkable.
    Water,
    /// Beach line around water.
    Sand,
    /// Default open ground.
    Grass,
    /// Dense vegetation that slows movement.
    Forest,
    /// Rock formations; never walkable.
    Mountain,
    /// High ground covered in snow.
    Snow,
}

impl Terrain {
    /// Reports whether units may stand on the terrain.
    #[must_use]
    pub const fn is_passable(self) -> bool {
        self.cost().is_some()
    }

    /// Relative traversal cost, or `None` for impassable terrain.
    #[must_use]
    pub const fn cost(self) -> Option<u32> {
        match self {
            Self::DeepWater | Self::Water | Self::Mountain => None,
            Self::Sand | Self::Grass => Some(1),
            Self::Forest => Some(2),
            Self::Snow => Some(3),
        }
    }

    /// Reports whether buildings may be constructed on the terrain.
    #[must_use]
    pub const fn is_buildable(self) -> bool {
        matches!(self, Self::Sand | Self::Grass)
    }
}

/// Lowest traversal cost any passable terrain carries.
pub const MIN_TERRAIN_COST: u32 = 1;

/// Unique identifier assigned to an entity occupying a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Contents of a single tile stored in the matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    /// Ground tile describing the cell's terrain.
    Ground(Terrain),
    /// Building owned by the player.
    Building(EntityId),
    /// Resource crystal that blocks movement until mined.
    Crystal(EntityId),
    /// Decorative feature that units walk through.
    Scenery(EntityId),
}

impl TileKind {
    /// Reports whether the tile prevents units from entering its cell.
    #[must_use]
    pub const fn blocks_movement(self) -> bool {
        matches!(self, Self::Building(_) | Self::Crystal(_))
    }

    /// Entity that owns the tile, if it is not plain ground.
    #[must_use]
    pub const fn entity(self) -> Option<EntityId> {
        match self {
            Self::Ground(_) => None,
            Self::Building(id) | Self::Crystal(id) | Self::Scenery(id) => Some(id),
        }
    }
}

/// Single tile of the level together with its fog-of-war state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// What occupies the tile.
    pub kind: TileKind,
    /// Whether the tile is currently revealed to the player.
    pub visible: bool,
}

impl Tile {
    /// Creates a hidden tile of the provided kind.
    #[must_use]
    pub const fn new(kind: TileKind) -> Self {
        Self {
            kind,
            visible: false,
        }
    }

    /// Creates a hidden ground tile.
    #[must_use]
    pub const fn ground(terrain: Terrain) -> Self {
        Self::new(TileKind::Ground(terrain))
    }
}

/// Types of buildings that can be constructed on the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    /// Cheap obstacle used to shape enemy routes.
    Wall,
    /// Defensive tower.
    Tower,
    /// Resource generator covering a larger footprint.
    Generator,
}

impl BuildingKind {
    /// Region covered by the building when anchored at `origin`.
    #[must_use]
    pub const fn footprint(self, origin: MatrixPosition) -> MatrixRect {
        match self {
            Self::Wall | Self::Tower => MatrixRect::new(origin, 1, 1),
            Self::Generator => MatrixRect::new(origin, 2, 2),
        }
    }
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Requests construction of a building anchored at the provided cell.
    PlaceBuilding {
        /// Type of building to construct.
        kind: BuildingKind,
        /// Upper-left cell of the footprint.
        origin: MatrixPosition,
    },
    /// Requests demolition of an existing building.
    RemoveBuilding {
        /// Identifier of the building targeted for removal.
        building: EntityId,
    },
    /// Requests a crystal to be seeded on the provided cell.
    PlaceCrystal {
        /// Cell receiving the crystal.
        cell: MatrixPosition,
    },
    /// Requests removal of a mined crystal.
    RemoveCrystal {
        /// Identifier of the crystal.
        crystal: EntityId,
    },
    /// Lifts the fog of war around a cell.
    RevealArea {
        /// Centre of the revealed area.
        center: MatrixPosition,
        /// Chebyshev radius in cells.
        radius: u32,
    },
    /// Advances the simulation by one frame and drives the navigator.
    Tick {
        /// Simulated time elapsed since the previous tick, in milliseconds.
        dt_ms: u32,
    },
    /// Cancels every outstanding path request ahead of world teardown.
    Teardown,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Elapsed time in milliseconds.
        dt_ms: u32,
    },
    /// Summarises the navigator work performed during a tick.
    NavigatorAdvanced {
        /// Work report produced by the navigator.
        report: TickReport,
    },
    /// Confirms that a building was placed.
    BuildingPlaced {
        /// Identifier allocated to the building.
        building: EntityId,
        /// Type of building that was placed.
        kind: BuildingKind,
        /// Cells occupied by the building.
        region: MatrixRect,
    },
    /// Confirms that a building was removed.
    BuildingRemoved {
        /// Identifier of the removed building.
        building: EntityId,
        /// Cells the building previously occupied.
        region: MatrixRect,
    },
    /// Reports that a placement request was rejected.
    BuildingPlacementRejected {
        /// Type of building requested.
        kind: BuildingKind,
        /// Origin provided in the request.
        origin: MatrixPosition,
        /// Specific reason the placement failed.
        reason: PlacementError,
    },
    /// Reports that a removal request was rejected.
    BuildingRemovalRejected {
        /// Identifier provided in the request.
        building: EntityId,
        /// Specific reason the removal failed.
        reason: RemovalError,
    },
    /// Confirms that a crystal was seeded.
    CrystalPlaced {
        /// Identifier allocated to the crystal.
        crystal: EntityId,
        /// Cell holding the crystal.
        cell: MatrixPosition,
    },
    /// Confirms that a crystal was removed.
    CrystalRemoved {
        /// Identifier of the removed crystal.
        crystal: EntityId,
        /// Cell the crystal previously occupied.
        cell: MatrixPosition,
    },
    /// Reports that a crystal could not be seeded.
    CrystalPlacementRejected {
        /// Cell provided in the request.
        cell: MatrixPosition,
        /// Specific reason the placement failed.
        reason: PlacementError,
    },
    /// Reports that a crystal removal request was rejected.
    CrystalRemovalRejected {
        /// Identifier provided in the request.
        crystal: EntityId,
        /// Specific reason the removal failed.
        reason: RemovalError,
    },
    /// Reports the number of tiles revealed by a reveal request.
    TilesRevealed {
        /// Count of cells that switched from hidden to visible.
        count: u32,
    },
    /// Confirms that every pending path request was cancelled.
    NavigatorCleared {
        /// Number of tasks dropped without resolution.
        cancelled: usize,
    },
}

/// Reasons a placement request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementError {
    /// The footprint extends beyond the level.
    OutOfBounds,
    /// The footprint overlaps an existing occupant.
    Occupied,
    /// The footprint covers terrain that cannot hold buildings.
    Unbuildable,
}

/// Reasons a removal request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalError {
    /// No occupant with the provided identifier exists.
    MissingEntity,
}

/// Unique identifier assigned to a navigator task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a new task identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Lifecycle of a path request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting in the navigator queue.
    Queued,
    /// Currently being searched; partial state persists across ticks.
    Running,
    /// Search finished and the outcome was delivered.
    Resolved,
    /// Request withdrawn before it resolved; no outcome is ever delivered.
    Cancelled,
}

impl TaskState {
    /// Reports whether the task left the queue for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }
}

/// Work performed by the navigator during a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TickReport {
    /// Node expansions spent across all tasks.
    pub expansions: u32,
    /// Tasks that resolved with a path.
    pub resolved: u32,
    /// Tasks that resolved without a path.
    pub failed: u32,
    /// Searches discarded and sent back to the queue because the level
    /// changed under them.
    pub restarts: u32,
    /// Tasks still queued or running after the tick.
    pub pending: usize,
}

/// Read-only walkability surface consulted by path searches.
///
/// Implementors must answer from current state on every call; searches never
/// cache the answers beyond a single expansion.
pub trait TileGraph {
    /// Number of columns and rows in the grid.
    fn dimensions(&self) -> (u32, u32);

    /// Reports whether a unit may stand on the provided cell.
    fn is_walkable(&self, cell: MatrixPosition) -> bool;

    /// Cost of entering the cell, or `None` when it is not walkable.
    fn traversal_cost(&self, cell: MatrixPosition) -> Option<u32>;

    /// Counter that changes whenever walkability of any cell changes.
    fn revision(&self) -> u64;

    /// Reports whether the cell lies inside the grid.
    fn contains(&self, cell: MatrixPosition) -> bool {
        let (width, height) = self.dimensions();
        cell.x() < width && cell.y() < height
    }
}
