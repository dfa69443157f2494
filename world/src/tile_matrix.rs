//! Dense layered storage for every tile of a level.

use thiserror::Error;
use tower_siege_core::{
    MatrixPosition, MatrixRect, Terrain, Tile, TileKind, TilePosition, GROUND_LAYER,
};
use tracing::warn;

/// Errors raised by tile matrix writes.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TileError {
    /// The addressed cell or layer lies outside the matrix.
    #[error(
        "tile position ({}, {}, {}) lies outside the matrix",
        .position.cell().x(),
        .position.cell().y(),
        .position.z()
    )]
    OutOfBounds {
        /// Rejected position.
        position: TilePosition,
    },
}

/// Fixed-size `width × height × depth` grid of optional tiles.
///
/// Layer [`GROUND_LAYER`] carries the terrain generated with the level; the
/// remaining layers carry occupants. The extent never changes after
/// construction and every access is bounds-checked through [`Self::index`].
#[derive(Clone, Debug)]
pub struct TileMatrix {
    width: u32,
    height: u32,
    depth: u8,
    tiles: Vec<Option<Tile>>,
}

impl TileMatrix {
    /// Creates an empty matrix with the provided extent.
    #[must_use]
    pub fn new(width: u32, height: u32, depth: u8) -> Self {
        let capacity = u64::from(width) * u64::from(height) * u64::from(depth);
        let capacity = usize::try_from(capacity).unwrap_or(0);
        Self {
            width,
            height,
            depth,
            tiles: vec![None; capacity],
        }
    }

    /// Number of columns and rows.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of layers stacked on each cell.
    #[must_use]
    pub const fn depth(&self) -> u8 {
        self.depth
    }

    /// Reports whether the cell lies inside the matrix.
    #[must_use]
    pub const fn contains(&self, cell: MatrixPosition) -> bool {
        cell.x() < self.width && cell.y() < self.height
    }

    /// Stores `tile` at `position`, replacing and returning any previous tile.
    pub fn put_tile(&mut self, tile: Tile, position: TilePosition) -> Result<Option<Tile>, TileError> {
        let Some(index) = self.index(position) else {
            warn!(
                x = position.cell().x(),
                y = position.cell().y(),
                z = position.z(),
                "ignoring tile write outside the matrix"
            );
            return Err(TileError::OutOfBounds { position });
        };
        Ok(self.tiles[index].replace(tile))
    }

    /// Returns the tile stored at `position`, if any.
    #[must_use]
    pub fn get_tile(&self, position: TilePosition) -> Option<&Tile> {
        self.index(position)
            .and_then(|index| self.tiles.get(index))
            .and_then(Option::as_ref)
    }

    /// Clears `position`, returning the tile that was stored there.
    pub fn remove_tile(&mut self, position: TilePosition) -> Option<Tile> {
        let index = self.index(position)?;
        self.tiles[index].take()
    }

    /// Terrain of the ground tile at `cell`.
    #[must_use]
    pub fn terrain(&self, cell: MatrixPosition) -> Option<Terrain> {
        match self.get_tile(cell.at_layer(GROUND_LAYER))?.kind {
            TileKind::Ground(terrain) => Some(terrain),
            _ => None,
        }
    }

    /// Reports whether any layer of `cell` holds a movement-blocking tile.
    #[must_use]
    pub fn is_blocked(&self, cell: MatrixPosition) -> bool {
        self.tiles_at(cell).any(|(_, tile)| tile.kind.blocks_movement())
    }

    /// Iterates the occupied layers of a single cell, bottom to top.
    pub fn tiles_at(&self, cell: MatrixPosition) -> impl Iterator<Item = (TilePosition, &Tile)> {
        (0..self.depth).filter_map(move |z| {
            let position = cell.at_layer(z);
            self.get_tile(position).map(|tile| (position, tile))
        })
    }

    /// Iterates every stored tile inside `area`, clamped to the matrix.
    pub fn tiles_in_area(&self, area: MatrixRect) -> impl Iterator<Item = (TilePosition, &Tile)> {
        area.cells()
            .filter(|cell| self.contains(*cell))
            .flat_map(move |cell| self.tiles_at(cell))
    }

    /// Marks every tile on `cell` as revealed or hidden.
    ///
    /// Returns `true` when the ground tile changed state.
    pub fn set_visible(&mut self, cell: MatrixPosition, visible: bool) -> bool {
        let ground_changed = self.is_visible(cell) != visible;
        for z in 0..self.depth {
            if let Some(index) = self.index(cell.at_layer(z)) {
                if let Some(tile) = self.tiles[index].as_mut() {
                    tile.visible = visible;
                }
            }
        }
        ground_changed && self.get_tile(cell.at_layer(GROUND_LAYER)).is_some()
    }

    /// Reports whether the ground tile at `cell` is revealed.
    #[must_use]
    pub fn is_visible(&self, cell: MatrixPosition) -> bool {
        self.get_tile(cell.at_layer(GROUND_LAYER))
            .is_some_and(|tile| tile.visible)
    }

    fn index(&self, position: TilePosition) -> Option<usize> {
        let cell = position.cell();
        if !self.contains(cell) || position.z() >= self.depth {
            return None;
        }
        let width = usize::try_from(self.width).ok()?;
        let height = usize::try_from(self.height).ok()?;
        let layer = usize::from(position.z());
        let row = usize::try_from(cell.y()).ok()?;
        let column = usize::try_from(cell.x()).ok()?;
        layer
            .checked_mul(height)?
            .checked_add(row)?
            .checked_mul(width)?
            .checked_add(column)
    }
}
