//! Periodic `game_state` fan-out.

use crate::registry::{OutboundFrame, PlayerRegistry};
use log::{debug, warn};
use shared::{codec, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between broadcaster stats lines.
const STATS_EVERY_TICKS: u64 = 300;

/// Runs forever, sending one snapshot of every player to every admitted
/// connection per `period`. Nothing is sent while the registry is empty.
pub async fn run_broadcaster(registry: Arc<PlayerRegistry>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        ticker.tick().await;
        tick = tick.wrapping_add(1);

        let delivered = broadcast_once(&registry).await;

        if tick % STATS_EVERY_TICKS == 0 {
            debug!("Broadcast tick {}: {} connection(s)", tick, delivered);
        }
    }
}

/// Sends one snapshot. Returns how many connections accepted it.
pub async fn broadcast_once(registry: &PlayerRegistry) -> usize {
    let (players, outbound) = {
        let guard = registry.lock().await;
        if guard.is_empty() {
            return 0;
        }
        (guard.snapshot(), guard.outbound())
    };

    let frame: OutboundFrame = match codec::encode(&ServerMessage::GameState { players }) {
        Ok(frame) => frame.into(),
        Err(e) => {
            warn!("Failed to encode game state: {}", e);
            return 0;
        }
    };

    // A full queue only costs that client this snapshot.
    outbound
        .iter()
        .filter(|(_, connection)| connection.send(Arc::clone(&frame)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, OUTBOUND_QUEUE_LEN};
    use std::net::SocketAddr;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:5555".parse().unwrap()
    }

    #[tokio::test]
    async fn test_empty_registry_sends_nothing() {
        let registry = PlayerRegistry::new();
        assert_eq!(broadcast_once(&registry).await, 0);
    }

    #[tokio::test]
    async fn test_every_connection_gets_same_snapshot() {
        let registry = PlayerRegistry::new();
        let (alice, mut alice_rx) = Connection::channel(test_addr());
        let (bob, mut bob_rx) = Connection::channel(test_addr());
        {
            let mut guard = registry.lock().await;
            guard.insert("alice", (1000.0, 1000.0), 100, alice).unwrap();
            guard.insert("bob", (1040.0, 960.0), 100, bob).unwrap();
        }

        assert_eq!(broadcast_once(&registry).await, 2);

        let frame = alice_rx.try_recv().unwrap();
        assert_eq!(frame, bob_rx.try_recv().unwrap());

        let message: ServerMessage = codec::decode(&frame[codec::LENGTH_PREFIX_LEN..]).unwrap();
        match message {
            ServerMessage::GameState { players } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[&1].username, "alice");
                assert_eq!((players[&2].x, players[&2].y), (1040.0, 960.0));
            }
            other => panic!("expected game_state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_queue_only_skips_that_client() {
        let registry = PlayerRegistry::new();
        let (slow, _slow_rx) = Connection::channel(test_addr());
        let (fast, mut fast_rx) = Connection::channel(test_addr());
        let filler: OutboundFrame = Arc::from(vec![0u8; 4]);
        for _ in 0..OUTBOUND_QUEUE_LEN {
            assert!(slow.send(Arc::clone(&filler)));
        }
        {
            let mut guard = registry.lock().await;
            guard.insert("slow", (0.0, 0.0), 100, slow).unwrap();
            guard.insert("fast", (0.0, 0.0), 100, fast).unwrap();
        }

        assert_eq!(broadcast_once(&registry).await, 1);
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcaster_ticks_at_period() {
        let registry = Arc::new(PlayerRegistry::new());
        let (conn, mut receiver) = Connection::channel(test_addr());
        registry
            .lock()
            .await
            .insert("alice", (0.0, 0.0), 100, conn)
            .unwrap();

        let task = tokio::spawn(run_broadcaster(Arc::clone(&registry), Duration::from_millis(100)));

        // The first tick fires immediately.
        assert!(receiver.recv().await.is_some());
        let start = tokio::time::Instant::now();
        assert!(receiver.recv().await.is_some());
        assert!(start.elapsed() >= Duration::from_millis(100));

        task.abort();
    }
}
