use crate::config::MapSettings;
use rand::Rng;
use shared::{SpawnArea, TileMap};

/// The generated map plus the area players spawn in.
#[derive(Debug, Clone)]
pub struct World {
    map: TileMap,
    spawn: SpawnArea,
}

impl World {
    pub fn new(settings: MapSettings, spawn: SpawnArea) -> Self {
        let map = TileMap::generate(settings.seed, settings.width, settings.height, settings.tile_size);
        Self { map, spawn }
    }

    pub fn seed(&self) -> u64 {
        self.map.seed()
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    /// A fresh spawn position on grass.
    pub fn spawn_position<R: Rng>(&self, rng: &mut R) -> (f64, f64) {
        self.map.find_spawn_position(rng, &self.spawn)
    }
}
