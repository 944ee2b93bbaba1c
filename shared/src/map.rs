//! Seeded tile map shared by the server and clients.
//!
//! The generator must draw from the random sequence in exactly the same
//! order on every machine: row-major (y outer, x inner), and a draw is only
//! taken when its branch is reached. Changing either breaks map agreement
//! with existing clients.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Distance from the map center beyond which trees are common.
const OUTER_RING: f64 = 20.0;
/// Distance from the map center beyond which trees are scattered.
const INNER_RING: f64 = 10.0;
const OUTER_TREE_CHANCE: f64 = 0.2;
const MID_TREE_CHANCE: f64 = 0.08;
const CLUSTER_RADIUS: f64 = 2.0;
const CLUSTER_TREE_CHANCE: f64 = 0.7;
const SPAWN_ATTEMPTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tile {
    Grass,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMap {
    seed: u64,
    width: usize,
    height: usize,
    tile_size: u32,
    tiles: Vec<Tile>,
}

impl TileMap {
    /// Generates the map for `seed`. Same inputs, same tiles.
    pub fn generate(seed: u64, width: usize, height: usize, tile_size: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let center_x = (width / 2) as f64;
        let center_y = (height / 2) as f64;
        let clusters = cluster_centers(width, height);

        let mut tiles = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let distance = euclidean(x as f64, y as f64, center_x, center_y);

                let tree = if distance > OUTER_RING {
                    rng.gen::<f64>() < OUTER_TREE_CHANCE
                        || in_tree_cluster(&mut rng, &clusters, x, y)
                } else if distance > INNER_RING {
                    rng.gen::<f64>() < MID_TREE_CHANCE
                        || in_tree_cluster(&mut rng, &clusters, x, y)
                } else {
                    in_tree_cluster(&mut rng, &clusters, x, y)
                };

                tiles.push(if tree { Tile::Tree } else { Tile::Grass });
            }
        }

        Self {
            seed,
            width,
            height,
            tile_size,
            tiles,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Tile at grid coordinates, `None` outside the grid.
    pub fn tile(&self, x: usize, y: usize) -> Option<Tile> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get(y * self.width + x).copied()
    }

    /// Tile under a world position, `None` outside the grid.
    pub fn tile_at(&self, world_x: f64, world_y: f64) -> Option<Tile> {
        let size = self.tile_size.max(1) as f64;
        let tile_x = (world_x / size).floor();
        let tile_y = (world_y / size).floor();
        if tile_x < 0.0 || tile_y < 0.0 {
            return None;
        }
        self.tile(tile_x as usize, tile_y as usize)
    }

    /// True when the world position is inside the map and not on a tree.
    pub fn is_valid_spawn(&self, world_x: f64, world_y: f64) -> bool {
        matches!(self.tile_at(world_x, world_y), Some(Tile::Grass))
    }

    /// Tries random integer offsets around the area's center and returns the
    /// first valid one. Falls back to the center itself, which the generator
    /// keeps clear for the default layout.
    pub fn find_spawn_position<R: Rng>(
        &self,
        rng: &mut R,
        area: &SpawnArea,
    ) -> (f64, f64) {
        let radius = area.radius as i64;
        for _ in 0..SPAWN_ATTEMPTS {
            let x = area.center_x + rng.gen_range(-radius..=radius) as f64;
            let y = area.center_y + rng.gen_range(-radius..=radius) as f64;
            if self.is_valid_spawn(x, y) {
                return (x, y);
            }
        }
        (area.center_x, area.center_y)
    }

    pub fn tree_count(&self) -> usize {
        self.tiles.iter().filter(|tile| **tile == Tile::Tree).count()
    }
}

/// Square region (center ± radius, world units) where players appear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnArea {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: u32,
}

impl SpawnArea {
    /// Area centered on the middle of a map.
    pub fn centered(width: usize, height: usize, tile_size: u32, radius: u32) -> Self {
        Self {
            center_x: ((width * tile_size as usize) / 2) as f64,
            center_y: ((height * tile_size as usize) / 2) as f64,
            radius,
        }
    }
}

fn cluster_centers(width: usize, height: usize) -> [(f64, f64); 4] {
    let near_x = (width / 5) as f64;
    let far_x = (4 * width / 5) as f64;
    let near_y = (height / 5) as f64;
    let far_y = (4 * height / 5) as f64;
    [(near_x, near_y), (far_x, near_y), (near_x, far_y), (far_x, far_y)]
}

fn in_tree_cluster<R: Rng>(rng: &mut R, clusters: &[(f64, f64)], x: usize, y: usize) -> bool {
    for &(cx, cy) in clusters {
        if euclidean(x as f64, y as f64, cx, cy) < CLUSTER_RADIUS
            && rng.gen::<f64>() < CLUSTER_TREE_CHANCE
        {
            return true;
        }
    }
    false
}

fn euclidean(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt()
}
