use clap::Parser;
use log::info;
use server::config::{CombatRules, MapSettings, ServerConfig, StoreLocation};
use server::credentials::{CredentialStore, MemoryCredentialStore, RedbCredentialStore};
use server::network::Server;
use shared::SpawnArea;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "5555")]
    port: u16,
    /// Map seed announced to clients
    #[clap(long, default_value_t = shared::DEFAULT_MAP_SEED)]
    seed: u64,
    /// Map width in tiles
    #[clap(long, default_value_t = shared::MAP_WIDTH)]
    map_width: usize,
    /// Map height in tiles
    #[clap(long, default_value_t = shared::MAP_HEIGHT)]
    map_height: usize,
    /// Tile edge length in world units
    #[clap(long, default_value = "40")]
    tile_size: u32,
    /// Damage dealt per hit
    #[clap(long, default_value_t = shared::ATTACK_DAMAGE)]
    attack_damage: u32,
    /// Minimum time between a player's attacks, in milliseconds
    #[clap(long, default_value_t = shared::ATTACK_COOLDOWN_MS)]
    attack_cooldown_ms: u64,
    /// Attack reach in world units
    #[clap(long, default_value_t = shared::ATTACK_RANGE)]
    attack_range: f64,
    /// Health of a fresh or respawned player
    #[clap(long, default_value_t = shared::MAX_HEALTH)]
    max_health: u32,
    /// Spawn center x in world units (defaults to the map center)
    #[clap(long)]
    spawn_x: Option<f64>,
    /// Spawn center y in world units (defaults to the map center)
    #[clap(long)]
    spawn_y: Option<f64>,
    /// Maximum spawn offset from the center, per axis
    #[clap(long, default_value_t = shared::SPAWN_RADIUS)]
    spawn_radius: u32,
    /// Tick rate (broadcasts per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Largest accepted message payload in bytes
    #[clap(long, default_value_t = shared::codec::DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
    /// Credential database file
    #[clap(long, default_value = "data/users.redb")]
    database: PathBuf,
    /// Keep credentials in memory only
    #[clap(long)]
    in_memory: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let map = MapSettings {
            seed: self.seed,
            width: self.map_width,
            height: self.map_height,
            tile_size: self.tile_size,
        };
        let mut spawn = SpawnArea::centered(map.width, map.height, map.tile_size, self.spawn_radius);
        if let Some(x) = self.spawn_x {
            spawn.center_x = x;
        }
        if let Some(y) = self.spawn_y {
            spawn.center_y = y;
        }

        ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            map,
            spawn,
            combat: CombatRules {
                damage: self.attack_damage,
                cooldown: Duration::from_millis(self.attack_cooldown_ms),
                range: self.attack_range,
                max_health: self.max_health,
            },
            broadcast_interval: Duration::from_secs_f32(1.0 / self.tick_rate.max(1) as f32),
            max_frame_len: self.max_frame_len,
            store: if self.in_memory {
                StoreLocation::Memory
            } else {
                StoreLocation::File(self.database)
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    match config.store.clone() {
        StoreLocation::Memory => {
            info!("Using in-memory credential store");
            serve(config, MemoryCredentialStore::new()).await
        }
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            info!("Using credential database {}", path.display());
            serve(config, RedbCredentialStore::open(&path)?).await
        }
    }
}

async fn serve<S: CredentialStore>(config: ServerConfig, store: S) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, store).await?;

    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
