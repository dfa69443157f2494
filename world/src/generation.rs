//! Seeded biome generation for new levels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tower_siege_core::{MatrixPosition, Terrain, Tile, GROUND_LAYER};

use crate::{
    level::{Level, Projection, LEVEL_DEPTH},
    tile_matrix::TileMatrix,
};

const SMOOTHING_PASSES: usize = 2;

/// Upper elevation bound of each terrain band, lowest first.
const TERRAIN_BANDS: [(f32, Terrain); 6] = [
    (0.10, Terrain::DeepWater),
    (0.20, Terrain::Water),
    (0.28, Terrain::Sand),
    (0.62, Terrain::Grass),
    (0.78, Terrain::Forest),
    (0.90, Terrain::Snow),
];

/// Generates a level whose terrain is fully determined by `seed`.
#[must_use]
pub fn generate_level(width: u32, height: u32, seed: u64, projection: Projection) -> Level {
    let elevation = elevation_map(width, height, seed);
    let mut matrix = TileMatrix::new(width, height, LEVEL_DEPTH);
    for (index, value) in elevation.iter().enumerate() {
        let Some(cell) = cell_at(index, width) else {
            continue;
        };
        let _ = matrix.put_tile(Tile::ground(terrain_for(*value)), cell.at_layer(GROUND_LAYER));
    }
    Level::new(matrix, projection)
}

/// Maps a normalized elevation to its terrain band.
#[must_use]
pub fn terrain_for(elevation: f32) -> Terrain {
    TERRAIN_BANDS
        .iter()
        .find(|(limit, _)| elevation < *limit)
        .map_or(Terrain::Mountain, |(_, terrain)| *terrain)
}

fn elevation_map(width: u32, height: u32, seed: u64) -> Vec<f32> {
    let (Ok(columns), Ok(rows)) = (usize::try_from(width), usize::try_from(height)) else {
        return Vec::new();
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut values: Vec<f32> = (0..columns * rows).map(|_| rng.gen::<f32>()).collect();

    for _ in 0..SMOOTHING_PASSES {
        values = smooth(&values, columns, rows);
    }
    normalize(&mut values);
    values
}

/// Averages every value with its in-bounds 3x3 neighbourhood.
fn smooth(values: &[f32], columns: usize, rows: usize) -> Vec<f32> {
    let mut smoothed = Vec::with_capacity(values.len());
    for row in 0..rows {
        for column in 0..columns {
            let mut sum = 0.0;
            let mut count = 0.0;
            for y in row.saturating_sub(1)..=(row + 1).min(rows - 1) {
                for x in column.saturating_sub(1)..=(column + 1).min(columns - 1) {
                    sum += values[y * columns + x];
                    count += 1.0;
                }
            }
            smoothed.push(sum / count);
        }
    }
    smoothed
}

fn normalize(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        values.iter_mut().for_each(|value| *value = 0.5);
        return;
    }
    for value in values.iter_mut() {
        *value = (*value - min) / range;
    }
}

fn cell_at(index: usize, width: u32) -> Option<MatrixPosition> {
    let width = usize::try_from(width).ok()?;
    let x = u32::try_from(index % width).ok()?;
    let y = u32::try_from(index / width).ok()?;
    Some(MatrixPosition::new(x, y))
}
