//! Level wrapper that converts coordinates and guards tile mutation.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use tower_siege_core::{
    MatrixPosition, MatrixRect, PlacementError, Terrain, Tile, TileGraph, TilePosition,
    GROUND_LAYER, OCCUPANT_LAYER,
};

use crate::tile_matrix::{TileError, TileMatrix};

/// Position expressed in world units.
pub type WorldPosition = Vec2;

/// Number of layers every generated level carries.
pub const LEVEL_DEPTH: u8 = 2;

/// Mapping between grid cells and world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    /// Square tiles laid out on a regular grid.
    Orthogonal {
        /// Width of a tile in world units.
        tile_width: f32,
        /// Height of a tile in world units.
        tile_height: f32,
    },
    /// Diamond tiles laid out on an isometric grid.
    Isometric {
        /// Width of a tile's diamond in world units.
        tile_width: f32,
        /// Height of a tile's diamond in world units.
        tile_height: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Isometric {
            tile_width: 52.0,
            tile_height: 26.0,
        }
    }
}

/// Authoritative grid of a single world.
///
/// Every occupancy or terrain mutation bumps [`Level::revision`], which the
/// navigator uses to discard searches seeded against older occupancy.
#[derive(Clone, Debug)]
pub struct Level {
    matrix: TileMatrix,
    projection: Projection,
    revision: u64,
}

impl Level {
    /// Wraps an existing matrix.
    #[must_use]
    pub fn new(matrix: TileMatrix, projection: Projection) -> Self {
        Self {
            matrix,
            projection,
            revision: 0,
        }
    }

    /// Creates a level covered entirely by a single terrain.
    #[must_use]
    pub fn flat(width: u32, height: u32, terrain: Terrain, projection: Projection) -> Self {
        let mut matrix = TileMatrix::new(width, height, LEVEL_DEPTH);
        for cell in MatrixRect::new(MatrixPosition::new(0, 0), width, height).cells() {
            let _ = matrix.put_tile(Tile::ground(terrain), cell.at_layer(GROUND_LAYER));
        }
        Self::new(matrix, projection)
    }

    /// Read-only access to the underlying tile matrix.
    #[must_use]
    pub const fn matrix(&self) -> &TileMatrix {
        &self.matrix
    }

    /// Projection used for coordinate conversion.
    #[must_use]
    pub const fn projection(&self) -> Projection {
        self.projection
    }

    /// Centre of `cell` in world space.
    #[must_use]
    pub fn to_world_position(&self, cell: MatrixPosition) -> WorldPosition {
        let x = cell.x() as f32;
        let y = cell.y() as f32;
        match self.projection {
            Projection::Orthogonal {
                tile_width,
                tile_height,
            } => Vec2::new((x + 0.5) * tile_width, (y + 0.5) * tile_height),
            Projection::Isometric {
                tile_width,
                tile_height,
            } => Vec2::new((x - y) * tile_width / 2.0, (x + y) * tile_height / 2.0),
        }
    }

    /// Cell containing `position`, or `None` when it falls outside the level.
    #[must_use]
    pub fn to_matrix_position(&self, position: WorldPosition) -> Option<MatrixPosition> {
        let (x, y) = match self.projection {
            Projection::Orthogonal {
                tile_width,
                tile_height,
            } => (
                (position.x / tile_width).floor(),
                (position.y / tile_height).floor(),
            ),
            Projection::Isometric {
                tile_width,
                tile_height,
            } => {
                let u = position.x / (tile_width / 2.0);
                let v = position.y / (tile_height / 2.0);
                (((v + u) / 2.0).round(), ((v - u) / 2.0).round())
            }
        };

        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let cell = MatrixPosition::new(x as u32, y as u32);
        self.matrix.contains(cell).then_some(cell)
    }

    /// Reports whether a unit may stand on `cell`.
    #[must_use]
    pub fn is_walkable(&self, cell: MatrixPosition) -> bool {
        self.traversal_cost(cell).is_some()
    }

    /// Terrain cost of entering `cell`, or `None` when it is not walkable.
    #[must_use]
    pub fn traversal_cost(&self, cell: MatrixPosition) -> Option<u32> {
        if self.matrix.is_blocked(cell) {
            return None;
        }
        self.matrix.terrain(cell)?.cost()
    }

    /// Returns the tile stored at `position`, if any.
    #[must_use]
    pub fn get_tile(&self, position: TilePosition) -> Option<&Tile> {
        self.matrix.get_tile(position)
    }

    /// Stores `tile` at `position`; last write wins.
    pub fn put_tile(&mut self, tile: Tile, position: TilePosition) -> Result<Option<Tile>, TileError> {
        let previous = self.matrix.put_tile(tile, position)?;
        self.revision += 1;
        Ok(previous)
    }

    /// Clears `position`, returning the tile that was stored there.
    pub fn remove_tile(&mut self, position: TilePosition) -> Option<Tile> {
        let removed = self.matrix.remove_tile(position)?;
        self.revision += 1;
        Some(removed)
    }

    /// Replaces the ground terrain of `cell`.
    pub fn set_terrain(&mut self, cell: MatrixPosition, terrain: Terrain) -> Result<(), TileError> {
        let position = cell.at_layer(GROUND_LAYER);
        let visible = self.matrix.is_visible(cell);
        let tile = Tile {
            visible,
            ..Tile::ground(terrain)
        };
        let _ = self.put_tile(tile, position)?;
        Ok(())
    }

    /// Reveals every cell within `radius` (Chebyshev) of `center`.
    ///
    /// Returns the number of cells that switched from hidden to visible.
    pub fn reveal(&mut self, center: MatrixPosition, radius: u32) -> u32 {
        let origin = MatrixPosition::new(
            center.x().saturating_sub(radius),
            center.y().saturating_sub(radius),
        );
        let span = radius.saturating_mul(2).saturating_add(1);
        let area = MatrixRect::new(origin, span, span);

        let mut revealed = 0;
        for cell in area.cells() {
            if cell.chebyshev_distance(center) <= radius
                && self.matrix.contains(cell)
                && self.matrix.set_visible(cell, true)
            {
                revealed += 1;
            }
        }
        revealed
    }

    /// Reports whether the ground tile at `cell` is revealed.
    #[must_use]
    pub fn is_visible(&self, cell: MatrixPosition) -> bool {
        self.matrix.is_visible(cell)
    }

    /// Checks that a building could occupy `footprint` on the occupant layer.
    pub fn check_footprint(&self, footprint: MatrixRect) -> Result<(), PlacementError> {
        if footprint.width() == 0 || footprint.height() == 0 {
            return Err(PlacementError::OutOfBounds);
        }
        for cell in footprint.cells() {
            if !self.matrix.contains(cell) {
                return Err(PlacementError::OutOfBounds);
            }
        }
        for cell in footprint.cells() {
            if self.get_tile(cell.at_layer(OCCUPANT_LAYER)).is_some() || self.matrix.is_blocked(cell) {
                return Err(PlacementError::Occupied);
            }
            if !self.matrix.terrain(cell).is_some_and(Terrain::is_buildable) {
                return Err(PlacementError::Unbuildable);
            }
        }
        Ok(())
    }

    /// Iterates every walkable cell in row-major order.
    pub fn walkable_cells(&self) -> impl Iterator<Item = MatrixPosition> + '_ {
        let (width, height) = self.matrix.dimensions();
        MatrixRect::new(MatrixPosition::new(0, 0), width, height)
            .cells()
            .filter(move |cell| self.is_walkable(*cell))
    }

    /// Counter bumped by every occupancy or terrain mutation.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}

impl TileGraph for Level {
    fn dimensions(&self) -> (u32, u32) {
        self.matrix.dimensions()
    }

    fn is_walkable(&self, cell: MatrixPosition) -> bool {
        Level::is_walkable(self, cell)
    }

    fn traversal_cost(&self, cell: MatrixPosition) -> Option<u32> {
        Level::traversal_cost(self, cell)
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}
