//! Input-delay buffering. Client inputs are stamped on arrival and only
//! applied once a fixed delay has passed, which evens out per-client RTT
//! jitter: everyone's inputs take effect the same wall-clock interval
//! after they were received.

use crate::components::{Controllable, PowerUp, Velocity, Weapon};
use crate::factory;
use graviton::ecs::{Entity, Registry};
use photon::wire::InputMask;
use photon::ClientId;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct InputDelayConfig {
    /// Wall-clock delay between receipt and application.
    pub delay: Duration,
    /// Cap per client; the oldest entry is dropped at capacity.
    pub max_buffered: usize,
    /// Entries older than this are stale and discarded unapplied.
    pub entry_timeout: Duration,
}

impl Default for InputDelayConfig {
    fn default() -> InputDelayConfig {
        InputDelayConfig {
            delay: Duration::from_millis(50),
            max_buffered: 100,
            entry_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InputEntry {
    pub client_timestamp: u32,
    pub mask: InputMask,
    pub received_at: Instant,
}

#[derive(Debug, Default)]
struct ClientInputBuffer {
    entries: VecDeque<InputEntry>,
}

impl ClientInputBuffer {
    fn push(&mut self, entry: InputEntry, max_buffered: usize) {
        while self.entries.len() >= max_buffered {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain_ready(&mut self, now: Instant, config: &InputDelayConfig) -> Vec<InputEntry> {
        // Stale entries leave first so they can never be applied.
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.received_at) >= config.entry_timeout {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        let mut ready = Vec::new();
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.received_at) >= config.delay {
                ready.push(self.entries.pop_front().unwrap());
            } else {
                break;
            }
        }

        ready
    }
}

/// All per-client input FIFOs. Keyed by a `BTreeMap` so that inputs which
/// become eligible on the same tick apply in client-id order.
pub struct InputBuffers {
    buffers: BTreeMap<ClientId, ClientInputBuffer>,
    config: InputDelayConfig,
}

impl InputBuffers {
    pub fn new(config: InputDelayConfig) -> InputBuffers {
        InputBuffers {
            buffers: BTreeMap::new(),
            config,
        }
    }

    pub fn add(&mut self, client_id: ClientId, client_timestamp: u32, mask: InputMask, now: Instant) {
        let max = self.config.max_buffered;
        self.buffers.entry(client_id).or_default().push(
            InputEntry {
                client_timestamp,
                mask,
                received_at: now,
            },
            max,
        );
    }

    /// Every input whose delay has elapsed, client-id order first, arrival
    /// order within a client.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<(ClientId, InputEntry)> {
        let config = self.config;
        let mut ready = Vec::new();

        for (&client_id, buffer) in self.buffers.iter_mut() {
            for entry in buffer.drain_ready(now, &config) {
                ready.push((client_id, entry));
            }
        }

        ready
    }

    pub fn remove_client(&mut self, client_id: ClientId) {
        self.buffers.remove(&client_id);
    }

    pub fn buffered_len(&self, client_id: ClientId) -> usize {
        self.buffers
            .get(&client_id)
            .map(|buffer| buffer.entries.len())
            .unwrap_or(0)
    }
}

/// What applying one input did, for the session to broadcast about.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct InputEffects {
    pub fired: bool,
    pub activated_powerup: bool,
}

/// Applies one input mask to a player entity: movement bits set velocity
/// up to the configured speed, the shoot bit consults the weapon gate, and
/// the activate bit starts a held power-up.
pub fn apply_input(reg: &mut Registry, player: Entity, mask: InputMask) -> InputEffects {
    let mut effects = InputEffects::default();

    let speed = match reg.get_component::<Controllable>(player) {
        Some(controllable) => controllable.speed,
        None => return effects,
    };

    if let Some(vel) = reg.get_component_mut::<Velocity>(player) {
        vel.vx = 0.0;
        vel.vy = 0.0;

        if mask.up() {
            vel.vy = -speed;
        }
        if mask.down() {
            vel.vy = speed;
        }
        if mask.left() {
            vel.vx = -speed;
        }
        if mask.right() {
            vel.vx = speed;
        }
    }

    if mask.activate() {
        if let Some(powerup) = reg.get_component_mut::<PowerUp>(player) {
            if !powerup.active {
                powerup.active = true;
                effects.activated_powerup = true;
            }
        }
    }

    if mask.shoot() {
        let can_fire = reg
            .get_component::<Weapon>(player)
            .map(|weapon| weapon.can_fire())
            .unwrap_or(false);

        if can_fire {
            factory::spawn_player_volley(reg, player);
            if let Some(weapon) = reg.get_component_mut::<Weapon>(player) {
                weapon.reset_cooldown();
            }
            effects.fired = true;
        }
    }

    effects
}
