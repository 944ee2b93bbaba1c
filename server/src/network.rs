//! TCP listener and task wiring.

use crate::auth::Authenticator;
use crate::broadcast::run_broadcaster;
use crate::combat::CombatResolver;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionContext};
use crate::credentials::CredentialStore;
use crate::registry::PlayerRegistry;
use crate::world::World;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The world server: one listener, one broadcaster, one task per connection.
pub struct Server<S: CredentialStore> {
    listener: TcpListener,
    context: Arc<ConnectionContext<S>>,
    broadcast_interval: Duration,
}

impl<S: CredentialStore> Server<S> {
    /// Generates the map and binds the listener. Nothing is accepted until
    /// [`Server::run`].
    pub async fn bind(config: ServerConfig, store: S) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.address).await?;

        let world = Arc::new(World::new(config.map, config.spawn));
        info!(
            "Generated {}x{} map from seed {} with {} trees",
            world.map().width(),
            world.map().height(),
            world.seed(),
            world.map().tree_count()
        );

        let registry = Arc::new(PlayerRegistry::new());
        let context = ConnectionContext {
            auth: Authenticator::new(
                store,
                Arc::clone(&registry),
                Arc::clone(&world),
                config.combat.max_health,
            ),
            combat: CombatResolver::new(Arc::clone(&registry), world, config.combat),
            registry,
            max_frame_len: config.max_frame_len,
        };

        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            context: Arc::new(context),
            broadcast_interval: config.broadcast_interval,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Broadcasts and accepts connections until the future is dropped.
    /// A failing connection never stops the loop.
    pub async fn run(self) {
        let registry = Arc::clone(&self.context.registry);
        tokio::select! {
            _ = run_broadcaster(registry, self.broadcast_interval) => {}
            _ = self.accept_loop() => {}
        }
    }

    async fn accept_loop(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Accepted connection from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    tokio::spawn(handle_connection(stream, addr, Arc::clone(&self.context)));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}
