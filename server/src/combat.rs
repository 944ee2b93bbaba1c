//! Melee resolution.
//!
//! An attack hits every other player within range of the attacker. The
//! cooldown check, damage, death and respawn all happen under one registry
//! lock, so observers never see a dead player or a half-applied attack. The
//! resulting events go to every connected client, bystanders included. A
//! client that cannot take an event is dropped instead of being left with a
//! stale view of its health.

use crate::config::CombatRules;
use crate::registry::{OutboundFrame, PlayerRegistry, RegistryGuard};
use crate::world::World;
use log::{debug, warn};
use rand::Rng;
use shared::{codec, AttackEvent, ServerMessage};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

pub struct CombatResolver {
    registry: Arc<PlayerRegistry>,
    world: Arc<World>,
    rules: CombatRules,
}

impl CombatResolver {
    pub fn new(registry: Arc<PlayerRegistry>, world: Arc<World>, rules: CombatRules) -> Self {
        Self {
            registry,
            world,
            rules,
        }
    }

    /// Resolves an attack by `attacker_id` now and sends every resulting
    /// event to all connections. Unknown attackers and attacks on cooldown
    /// produce nothing.
    pub async fn resolve_attack(&self, attacker_id: u32) -> Vec<AttackEvent> {
        let (events, outbound) = {
            let mut guard = self.registry.lock().await;
            let mut rng = rand::thread_rng();
            let events = self.resolve_with(&mut guard, attacker_id, Instant::now(), &mut rng);
            let outbound = if events.is_empty() {
                Vec::new()
            } else {
                guard.outbound()
            };
            (events, outbound)
        };

        let mut failed = BTreeSet::new();
        for event in &events {
            let frame: OutboundFrame = match codec::encode(&ServerMessage::AttackEvent(event.clone())) {
                Ok(frame) => frame.into(),
                Err(e) => {
                    warn!("Failed to encode attack event: {}", e);
                    continue;
                }
            };
            for (player_id, connection) in &outbound {
                if !failed.contains(player_id) && !connection.send(Arc::clone(&frame)) {
                    failed.insert(*player_id);
                }
            }
        }

        if !failed.is_empty() {
            let mut guard = self.registry.lock().await;
            for player_id in failed {
                if guard.remove(player_id).is_some() {
                    warn!("Dropping player {}: attack event could not be queued", player_id);
                }
            }
        }

        events
    }

    /// Applies one attack against a locked registry at time `now`.
    pub fn resolve_with<R: Rng>(
        &self,
        guard: &mut RegistryGuard<'_>,
        attacker_id: u32,
        now: Instant,
        rng: &mut R,
    ) -> Vec<AttackEvent> {
        if guard
            .begin_attack(attacker_id, now, self.rules.cooldown)
            .is_none()
        {
            return Vec::new();
        }

        let mut events = Vec::new();
        for target_id in guard.targets_within(attacker_id, self.rules.range) {
            let Some(remaining_health) = guard.apply_damage(target_id, self.rules.damage) else {
                continue;
            };

            let mut event = AttackEvent {
                attacker_id,
                target_id,
                damage: self.rules.damage,
                remaining_health,
                killed: false,
                respawn_x: None,
                respawn_y: None,
            };

            if remaining_health == 0 {
                let (x, y) = self.world.spawn_position(rng);
                guard.respawn(target_id, x, y);
                event.killed = true;
                event.respawn_x = Some(x);
                event.respawn_y = Some(y);
                debug!("Player {} killed player {}, respawning at ({}, {})", attacker_id, target_id, x, y);
            }

            events.push(event);
        }

        debug!("Player {} attacked, {} target(s) hit", attacker_id, events.len());
        events
    }
}
