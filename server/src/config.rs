use shared::codec::DEFAULT_MAX_FRAME_LEN;
use shared::SpawnArea;
use std::path::PathBuf;
use std::time::Duration;

/// Map layout the server generates and announces to clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapSettings {
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub tile_size: u32,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            seed: shared::DEFAULT_MAP_SEED,
            width: shared::MAP_WIDTH,
            height: shared::MAP_HEIGHT,
            tile_size: shared::TILE_SIZE as u32,
        }
    }
}

/// Melee tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatRules {
    pub damage: u32,
    pub cooldown: Duration,
    /// Inclusive reach, in world units.
    pub range: f64,
    pub max_health: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            damage: shared::ATTACK_DAMAGE,
            cooldown: Duration::from_millis(shared::ATTACK_COOLDOWN_MS),
            range: shared::ATTACK_RANGE,
            max_health: shared::MAX_HEALTH,
        }
    }
}

/// Where credentials live.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub map: MapSettings,
    pub spawn: SpawnArea,
    pub combat: CombatRules,
    pub broadcast_interval: Duration,
    pub max_frame_len: usize,
    pub store: StoreLocation,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let map = MapSettings::default();
        Self {
            address: "127.0.0.1:5555".to_string(),
            spawn: SpawnArea::centered(map.width, map.height, map.tile_size, shared::SPAWN_RADIUS),
            map,
            combat: CombatRules::default(),
            broadcast_interval: Duration::from_secs_f32(1.0 / 30.0),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            store: StoreLocation::File(PathBuf::from("data/users.redb")),
        }
    }
}

impl ServerConfig {
    /// Defaults with an in-memory store on an ephemeral local port.
    pub fn ephemeral() -> Self {
        Self {
            address: "127.0.0.1:0".to_string(),
            store: StoreLocation::Memory,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults_match_world_constants() {
        let config = ServerConfig::default();
        assert_eq!(config.map.seed, 12345);
        assert_eq!((config.map.width, config.map.height), (50, 50));
        assert_eq!(config.map.tile_size, 40);
        assert_eq!(config.combat.damage, 10);
        assert_eq!(config.combat.cooldown, Duration::from_secs(1));
        assert_eq!(config.combat.range, 60.0);
        assert_eq!(config.combat.max_health, 100);
        assert_eq!((config.spawn.center_x, config.spawn.center_y), (1000.0, 1000.0));
        assert_eq!(config.spawn.radius, 150);
        assert_approx_eq!(config.broadcast_interval.as_secs_f32(), 1.0 / 30.0, 1e-6);
    }

    #[test]
    fn test_ephemeral_uses_memory_store() {
        let config = ServerConfig::ephemeral();
        assert_eq!(config.store, StoreLocation::Memory);
        assert!(config.address.ends_with(":0"));
    }
}
