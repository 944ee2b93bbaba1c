//! Live state of every admitted player.
//!
//! The registry is the single source of truth shared by connection handlers,
//! the combat resolver and the broadcaster. One mutex guards the player map,
//! the outbound bindings and the active-session set together, so a username
//! is active exactly when a player with that name exists.
//!
//! No network I/O happens under the lock. Outbound traffic goes through each
//! connection's bounded queue with `try_send`, which never waits.

use log::info;
use shared::PlayerState;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// An encoded frame ready to be written to a socket.
pub type OutboundFrame = Arc<[u8]>;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_QUEUE_LEN: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("user {0} already has an active session")]
    SessionActive(String),
}

/// Server-side player record.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: u32,
    pub username: String,
    pub x: f64,
    pub y: f64,
    pub health: u32,
    pub max_health: u32,
    /// `None` until the first attack, so a fresh player may attack at once.
    pub last_attack: Option<Instant>,
    pub color: [u8; 3],
}

impl Player {
    pub fn state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            username: self.username.clone(),
            x: self.x,
            y: self.y,
            health: self.health,
            max_health: self.max_health,
            color: self.color,
        }
    }

    fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Outbound half of an admitted connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub addr: SocketAddr,
    sender: mpsc::Sender<OutboundFrame>,
}

impl Connection {
    pub fn new(addr: SocketAddr, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self { addr, sender }
    }

    /// Creates a connection together with the receiving end of its queue.
    pub fn channel(addr: SocketAddr) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_LEN);
        (Self::new(addr, sender), receiver)
    }

    /// Queues a frame without waiting. Returns false when the queue is full
    /// or the writer is gone; the connection's handler deals with the latter.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    players: BTreeMap<u32, Player>,
    connections: HashMap<u32, Connection>,
    active_sessions: HashSet<String>,
    last_player_id: u32,
}

#[derive(Default)]
pub struct PlayerRegistry {
    inner: Mutex<RegistryInner>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the registry for a multi-step operation.
    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            inner: self.inner.lock().await,
        }
    }

    pub async fn remove(&self, player_id: u32) -> Option<Player> {
        self.lock().await.remove(player_id)
    }

    pub async fn update_position(&self, player_id: u32, x: f64, y: f64) -> bool {
        self.lock().await.update_position(player_id, x, y)
    }

    pub async fn apply_damage(&self, player_id: u32, amount: u32) -> Option<u32> {
        self.lock().await.apply_damage(player_id, amount)
    }

    pub async fn respawn(&self, player_id: u32, x: f64, y: f64) -> bool {
        self.lock().await.respawn(player_id, x, y)
    }

    pub async fn snapshot(&self) -> BTreeMap<u32, PlayerState> {
        self.lock().await.snapshot()
    }

    pub async fn player(&self, player_id: u32) -> Option<Player> {
        self.lock().await.player(player_id).cloned()
    }

    pub async fn is_active(&self, username: &str) -> bool {
        self.lock().await.is_active(username)
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }
}

/// Exclusive access to the registry. Every read and write goes through here.
pub struct RegistryGuard<'a> {
    inner: MutexGuard<'a, RegistryInner>,
}

impl RegistryGuard<'_> {
    /// Admits a player: claims the username's session, allocates the next
    /// id and binds the connection, all in one step.
    pub fn insert(
        &mut self,
        username: &str,
        position: (f64, f64),
        max_health: u32,
        connection: Connection,
    ) -> Result<Player, RegistryError> {
        if self.inner.active_sessions.contains(username) {
            return Err(RegistryError::SessionActive(username.to_string()));
        }

        self.inner.last_player_id += 1;
        let id = self.inner.last_player_id;
        let player = Player {
            id,
            username: username.to_string(),
            x: position.0,
            y: position.1,
            health: max_health,
            max_health,
            last_attack: None,
            color: shared::DEFAULT_COLOR,
        };

        info!(
            "Player {} ({}) joined from {} at ({}, {})",
            id, username, connection.addr, player.x, player.y
        );
        self.inner.active_sessions.insert(username.to_string());
        self.inner.connections.insert(id, connection);
        self.inner.players.insert(id, player.clone());
        Ok(player)
    }

    /// Removes the player, its binding and its session.
    pub fn remove(&mut self, player_id: u32) -> Option<Player> {
        self.inner.connections.remove(&player_id);
        let player = self.inner.players.remove(&player_id)?;
        self.inner.active_sessions.remove(&player.username);
        info!("Player {} ({}) left", player.id, player.username);
        Some(player)
    }

    pub fn update_position(&mut self, player_id: u32, x: f64, y: f64) -> bool {
        match self.inner.players.get_mut(&player_id) {
            Some(player) => {
                player.x = x;
                player.y = y;
                true
            }
            None => false,
        }
    }

    /// Subtracts `amount`, flooring at zero. Returns the new health.
    pub fn apply_damage(&mut self, player_id: u32, amount: u32) -> Option<u32> {
        let player = self.inner.players.get_mut(&player_id)?;
        player.health = player.health.saturating_sub(amount);
        Some(player.health)
    }

    /// Restores full health at a new position.
    pub fn respawn(&mut self, player_id: u32, x: f64, y: f64) -> bool {
        match self.inner.players.get_mut(&player_id) {
            Some(player) => {
                player.health = player.max_health;
                player.x = x;
                player.y = y;
                true
            }
            None => false,
        }
    }

    /// Starts an attack if the player exists and is off cooldown, stamping
    /// `now` as its last attack. Returns the attacker's position.
    pub fn begin_attack(
        &mut self,
        player_id: u32,
        now: Instant,
        cooldown: Duration,
    ) -> Option<(f64, f64)> {
        let player = self.inner.players.get_mut(&player_id)?;
        if let Some(last) = player.last_attack {
            if now.saturating_duration_since(last) < cooldown {
                return None;
            }
        }
        player.last_attack = Some(now);
        Some((player.x, player.y))
    }

    /// Ids of every other player within `radius` (inclusive) of the given
    /// player's position, in id order.
    pub fn targets_within(&self, player_id: u32, radius: f64) -> Vec<u32> {
        let Some(origin) = self.inner.players.get(&player_id) else {
            return Vec::new();
        };
        self.inner
            .players
            .values()
            .filter(|other| other.id != player_id)
            .filter(|other| other.distance_to(origin.x, origin.y) <= radius)
            .map(|other| other.id)
            .collect()
    }

    pub fn player(&self, player_id: u32) -> Option<&Player> {
        self.inner.players.get(&player_id)
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.inner.active_sessions.contains(username)
    }

    /// Point-in-time copy of every player, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<u32, PlayerState> {
        self.inner
            .players
            .iter()
            .map(|(id, player)| (*id, player.state()))
            .collect()
    }

    /// Clones of every bound connection with its player id, for fan-out
    /// after the lock is released.
    pub fn outbound(&self) -> Vec<(u32, Connection)> {
        self.inner
            .connections
            .iter()
            .map(|(id, connection)| (*id, connection.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:5555".parse().unwrap()
    }

    fn connection() -> Connection {
        Connection::channel(test_addr()).0
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let registry = PlayerRegistry::new();
        let mut guard = registry.lock().await;

        let alice = guard.insert("alice", (1000.0, 1000.0), 100, connection()).unwrap();
        let bob = guard.insert("bob", (1040.0, 1000.0), 100, connection()).unwrap();

        assert_eq!((alice.id, bob.id), (1, 2));
        assert_eq!(alice.health, 100);
        assert_eq!(alice.color, [0, 0, 255]);
        assert_eq!(alice.last_attack, None);
        assert_eq!(guard.len(), 2);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let registry = PlayerRegistry::new();
        let mut guard = registry.lock().await;

        let first = guard.insert("alice", (0.0, 0.0), 100, connection()).unwrap();
        guard.remove(first.id);
        let second = guard.insert("alice", (0.0, 0.0), 100, connection()).unwrap();

        assert_eq!(second.id, first.id + 1);
    }

    #[tokio::test]
    async fn test_one_session_per_username() {
        let registry = PlayerRegistry::new();
        let mut guard = registry.lock().await;

        let player = guard.insert("alice", (0.0, 0.0), 100, connection()).unwrap();
        assert!(guard.is_active("alice"));
        assert_eq!(
            guard.insert("alice", (0.0, 0.0), 100, connection()),
            Err(RegistryError::SessionActive("alice".to_string()))
        );
        assert_eq!(guard.len(), 1);

        guard.remove(player.id);
        assert!(!guard.is_active("alice"));
        assert!(guard.insert("alice", (0.0, 0.0), 100, connection()).is_ok());
    }

    #[tokio::test]
    async fn test_remove_drops_binding() {
        let registry = PlayerRegistry::new();
        let (conn, mut receiver) = Connection::channel(test_addr());
        let id = registry
            .lock()
            .await
            .insert("alice", (0.0, 0.0), 100, conn)
            .unwrap()
            .id;

        assert_eq!(registry.lock().await.outbound().len(), 1);
        assert!(registry.remove(id).await.is_some());
        assert!(registry.lock().await.outbound().is_empty());
        assert!(registry.is_empty().await);
        // The only sender lived in the registry.
        assert!(receiver.recv().await.is_none());

        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn test_update_position_is_unvalidated() {
        let registry = PlayerRegistry::new();
        let id = registry
            .lock()
            .await
            .insert("alice", (0.0, 0.0), 100, connection())
            .unwrap()
            .id;

        assert!(registry.update_position(id, -500.0, 99_999.0).await);
        let player = registry.player(id).await.unwrap();
        assert_eq!((player.x, player.y), (-500.0, 99_999.0));

        assert!(!registry.update_position(42, 1.0, 1.0).await);
    }

    #[tokio::test]
    async fn test_damage_floors_at_zero_and_respawn_restores() {
        let registry = PlayerRegistry::new();
        let id = registry
            .lock()
            .await
            .insert("alice", (0.0, 0.0), 100, connection())
            .unwrap()
            .id;

        assert_eq!(registry.apply_damage(id, 30).await, Some(70));
        assert_eq!(registry.apply_damage(id, 500).await, Some(0));
        assert!(registry.respawn(id, 960.0, 1000.0).await);

        let player = registry.player(id).await.unwrap();
        assert_eq!(player.health, 100);
        assert_eq!((player.x, player.y), (960.0, 1000.0));
        assert_eq!(registry.apply_damage(99, 1).await, None);
    }

    #[tokio::test]
    async fn test_begin_attack_enforces_cooldown() {
        let registry = PlayerRegistry::new();
        let mut guard = registry.lock().await;
        let id = guard.insert("alice", (5.0, 6.0), 100, connection()).unwrap().id;
        let cooldown = Duration::from_secs(1);
        let start = Instant::now();

        assert_eq!(guard.begin_attack(id, start, cooldown), Some((5.0, 6.0)));
        assert_eq!(guard.begin_attack(id, start + Duration::from_millis(999), cooldown), None);
        assert_eq!(
            guard.begin_attack(id, start + Duration::from_secs(1), cooldown),
            Some((5.0, 6.0))
        );
        assert_eq!(guard.begin_attack(77, start, cooldown), None);
    }

    #[tokio::test]
    async fn test_targets_within_radius() {
        let registry = PlayerRegistry::new();
        let mut guard = registry.lock().await;
        let attacker = guard.insert("a", (0.0, 0.0), 100, connection()).unwrap().id;
        let edge = guard.insert("b", (60.0, 0.0), 100, connection()).unwrap().id;
        let diagonal = guard.insert("c", (30.0, 40.0), 100, connection()).unwrap().id;
        let _outside = guard.insert("d", (60.0, 1.0), 100, connection()).unwrap().id;

        assert_eq!(guard.targets_within(attacker, 60.0), vec![edge, diagonal]);
        assert!(guard.targets_within(999, 60.0).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered_copy() {
        let registry = PlayerRegistry::new();
        {
            let mut guard = registry.lock().await;
            guard.insert("alice", (1.0, 2.0), 100, connection()).unwrap();
            guard.insert("bob", (3.0, 4.0), 100, connection()).unwrap();
        }

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(snapshot[&2].username, "bob");

        registry.update_position(2, 10.0, 10.0).await;
        assert_eq!(snapshot[&2].x, 3.0);
    }

    #[tokio::test]
    async fn test_connection_send_fails_when_full() {
        let (conn, _receiver) = Connection::channel(test_addr());
        let frame: OutboundFrame = Arc::from(vec![0u8; 4]);
        for _ in 0..OUTBOUND_QUEUE_LEN {
            assert!(conn.send(frame.clone()));
        }
        assert!(!conn.send(frame));
    }
}
