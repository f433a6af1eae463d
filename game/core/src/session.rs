//! The authoritative game session: lobby and login, inbound frame
//! dispatch, the per-tick system pipeline, wave execution, power-ups,
//! snapshots, and the admin surface. The session owns the ECS registry
//! exclusively; the network only ever meets it through queues and the
//! reliability layer.

use crate::admin::{self, AdminCommand};
use crate::components::{
    DamageFlash, Health, NetworkBinding, Owner, Position, PowerUp, PowerUpKind, Tag, Velocity,
};
use crate::config::{GameConfig, WorldRect};
use crate::factory;
use crate::input::{apply_input, InputBuffers, InputDelayConfig};
use crate::level::LevelConfig;
use crate::systems;
use crate::waves::{WaveDriver, WaveEvent, WavePhase};
use graviton::ecs::{Entity, Registry};
use graviton::net::{NetHandle, NetworkPacket, Reliability, SafeQueue};
use hashbrown::HashSet;
use photon::logging::{self, Logger};
use photon::wire::{
    EntityState, Message, FLAG_DAMAGE_FLASH, FLAG_ENEMY_OWNED, KIND_BOSS, KIND_ENEMY,
    KIND_EXPLOSION, KIND_PLAYER, KIND_PROJECTILE,
};
use photon::ClientId;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Lobby,
    Running,
    GameOver,
}

#[derive(Debug)]
pub struct PlayerSlot {
    pub entity: Entity,
    pub name: String,
    pub ready: bool,
}

pub struct GameSession {
    registry: Registry,
    inputs: InputBuffers,
    players: BTreeMap<ClientId, PlayerSlot>,
    phase: SessionPhase,

    levels: Vec<LevelConfig>,
    level_index: usize,
    wave: Option<WaveDriver>,
    kills: u32,
    kills_needed: u32,
    next_powerup_at: u32,
    score: u32,

    elapsed: f32,
    world: WorldRect,
    max_clients: usize,
    admin_password: String,
    powerup_threshold: u32,
    spawn_seed: u64,
    admin_endpoints: HashSet<SocketAddr>,

    log: Logger,
}

impl GameSession {
    pub fn new(config: &GameConfig, levels: Vec<LevelConfig>, log: &Logger) -> GameSession {
        let mut registry = Registry::new();

        // Register the component set up front so kill() hooks exist before
        // the first spawn of each archetype.
        registry.register_component::<Position>();
        registry.register_component::<Velocity>();
        registry.register_component::<Health>();
        registry.register_component::<Tag>();
        registry.register_component::<Owner>();
        registry.register_component::<NetworkBinding>();
        registry.register_component::<PowerUp>();
        registry.register_component::<DamageFlash>();

        GameSession {
            registry,
            inputs: InputBuffers::new(InputDelayConfig {
                delay: config.input_delay(),
                ..InputDelayConfig::default()
            }),
            players: BTreeMap::new(),
            phase: SessionPhase::Lobby,
            levels,
            level_index: 0,
            wave: None,
            kills: 0,
            kills_needed: 0,
            next_powerup_at: 0,
            score: 0,
            elapsed: 0.0,
            world: config.game.world,
            max_clients: config.server.max_clients as usize,
            admin_password: config.server.admin_password.clone(),
            powerup_threshold: config.game.powerup_kill_threshold.max(1),
            spawn_seed: config.game.spawn_seed,
            admin_endpoints: HashSet::new(),
            log: log.new(logging::o!("layer" => "session")),
        }
    }

    // ---- accessors (admin surface and tests) ----

    #[inline]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn kills(&self) -> u32 {
        self.kills
    }

    pub fn player_entity(&self, client_id: ClientId) -> Option<Entity> {
        self.players.get(&client_id).map(|slot| slot.entity)
    }

    pub fn wave_phase(&self) -> Option<WavePhase> {
        self.wave.as_ref().map(|driver| driver.phase())
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn live_enemy_count(&self) -> usize {
        self.registry
            .view::<(Tag,)>()
            .filter(|(_, (tag,))| matches!(tag, Tag::Enemy | Tag::Boss))
            .count()
    }

    fn live_player_count(&self) -> usize {
        self.players
            .values()
            .filter(|slot| self.registry.is_alive(slot.entity))
            .count()
    }

    fn player_ids(&self) -> Vec<ClientId> {
        self.players.keys().copied().collect()
    }

    // ---- inbound dispatch ----

    /// Drains the inbound queue: decode, ACK + reorder for reliable
    /// frames, then apply. Decode failures drop the packet and nothing
    /// else.
    pub fn process_inbound(
        &mut self,
        inbound: &SafeQueue<NetworkPacket>,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        for packet in inbound.drain() {
            let (header, message) = match Message::decode(&packet.data) {
                Ok(decoded) => decoded,
                Err(err) => {
                    logging::debug!(self.log, "dropping undecodable frame";
                                    "sender" => %packet.sender,
                                    "error" => %err);
                    continue;
                }
            };

            let client_id = match net.client_id_of(&packet.sender) {
                Some(client_id) => client_id,
                None => net.register(packet.sender, now),
            };

            if let Message::Ack { acked_seq } = message {
                rel.handle_ack(client_id, acked_seq);
                continue;
            }

            match header.seq {
                Some(seq) => {
                    // Always re-ACK: a duplicate means our previous ACK
                    // was lost.
                    net.send_to_endpoint(
                        packet.sender,
                        Message::Ack { acked_seq: seq }.encode_unreliable(),
                    );

                    for deliverable in rel.deliver(client_id, seq, message, now) {
                        self.apply_message(client_id, packet.sender, deliverable, net, rel, now);
                    }
                }
                None => self.apply_message(client_id, packet.sender, message, net, rel, now),
            }
        }
    }

    fn apply_message(
        &mut self,
        client_id: ClientId,
        sender: SocketAddr,
        message: Message,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        match message {
            Message::Login { player_name } => {
                self.handle_login(client_id, player_name, net, rel, now)
            }
            Message::Ready { flag } => self.handle_ready(client_id, flag, net, rel, now),
            Message::Input {
                mask,
                client_timestamp,
            } => {
                if self.players.contains_key(&client_id) {
                    self.inputs.add(client_id, client_timestamp, mask, now);
                } else {
                    // No implicit login.
                    logging::debug!(self.log, "input from unknown client dropped";
                                    "client_id" => client_id);
                }
            }
            Message::PowerUpChoice { choice } => self.handle_powerup_choice(client_id, choice),
            Message::PowerUpActivate => {
                self.handle_powerup_activate(client_id, net, rel, now);
            }
            Message::Disconnect => {
                logging::info!(self.log, "client disconnected"; "client_id" => client_id);
                self.remove_player(client_id, rel);
                net.remove_client(client_id);
            }
            Message::AdminLogin { password } => self.handle_admin_login(sender, &password, net),
            Message::AdminCommand { command } => {
                self.handle_admin_command(sender, &command, net, rel, now)
            }
            other => {
                logging::debug!(self.log, "unexpected opcode from client";
                                "client_id" => client_id,
                                "opcode" => ?other.opcode());
            }
        }
    }

    fn handle_login(
        &mut self,
        client_id: ClientId,
        player_name: String,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        if self.players.contains_key(&client_id) {
            // Duplicate login (lost ack); repeat the answer.
            rel.send(net, client_id, &Message::LoginAck { network_id: client_id }, now);
            return;
        }

        if self.players.len() >= self.max_clients {
            logging::warn!(self.log, "login rejected, server full";
                           "client_id" => client_id);
            return;
        }

        let seat = self.players.len() as u8;
        let entity = factory::spawn_player(&mut self.registry, client_id, seat, &self.world);

        let name = if player_name.trim().is_empty() {
            format!("player{}", client_id)
        } else {
            player_name.trim().to_string()
        };

        logging::info!(self.log, "player joined";
                       "client_id" => client_id,
                       "name" => %name,
                       "seat" => seat);

        self.players.insert(
            client_id,
            PlayerSlot {
                entity,
                name,
                ready: false,
            },
        );

        rel.send(net, client_id, &Message::LoginAck { network_id: client_id }, now);
        self.broadcast_lobby_status(net, rel, now);
    }

    fn handle_ready(
        &mut self,
        client_id: ClientId,
        flag: bool,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        if let Some(slot) = self.players.get_mut(&client_id) {
            slot.ready = flag;
        } else {
            return;
        }

        self.broadcast_lobby_status(net, rel, now);

        let all_ready = !self.players.is_empty() && self.players.values().all(|slot| slot.ready);
        if self.phase == SessionPhase::Lobby && all_ready {
            self.start_game(net, rel, now);
        }
    }

    fn handle_powerup_choice(&mut self, client_id: ClientId, choice: u8) {
        let entity = match self.player_entity(client_id) {
            Some(entity) => entity,
            None => return,
        };

        let kind = match choice {
            1 => PowerUpKind::PowerCannon,
            2 => PowerUpKind::Shield,
            other => {
                logging::debug!(self.log, "bad power-up choice";
                                "client_id" => client_id,
                                "choice" => other);
                return;
            }
        };

        logging::info!(self.log, "power-up chosen";
                       "client_id" => client_id,
                       "kind" => ?kind);
        self.registry.add_component(entity, PowerUp::held(kind));
    }

    fn handle_powerup_activate(
        &mut self,
        client_id: ClientId,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        let entity = match self.player_entity(client_id) {
            Some(entity) => entity,
            None => return,
        };

        let activated = match self.registry.get_component_mut::<PowerUp>(entity) {
            Some(powerup) if !powerup.active => {
                powerup.active = true;
                true
            }
            _ => false,
        };

        if activated {
            self.broadcast_powerup_status(client_id, net, rel, now);
        }
    }

    // ---- lifecycle ----

    fn start_game(&mut self, net: &NetHandle, rel: &Reliability, now: Instant) {
        logging::info!(self.log, "all players ready, starting game";
                       "players" => self.players.len());

        self.phase = SessionPhase::Running;
        rel.send_to_many(net, &self.player_ids(), &Message::StartGame, now);
        self.start_level(net, rel, now);
    }

    fn start_level(&mut self, net: &NetHandle, rel: &Reliability, now: Instant) {
        let level = match self.levels.get(self.level_index) {
            Some(level) => level.clone(),
            None => {
                logging::warn!(self.log, "no level to start, ending session");
                self.end_session(net, rel, now);
                return;
            }
        };

        let level_number = self.level_number();
        self.kills = 0;
        self.kills_needed = level.total_enemy_count();
        self.next_powerup_at = self.powerup_threshold;

        logging::info!(self.log, "level starting";
                       "level" => level_number,
                       "id" => %level.metadata.id,
                       "waves" => level.waves.len(),
                       "kills_needed" => self.kills_needed);

        let seed = self.spawn_seed.wrapping_add(self.level_index as u64);
        self.wave = Some(WaveDriver::new(level, seed));

        let ids = self.player_ids();
        rel.send_to_many(net, &ids, &Message::LevelStart { level: level_number }, now);
        rel.send_to_many(
            net,
            &ids,
            &Message::LevelProgress {
                level: level_number,
                kills: 0,
                kills_needed: self.kills_needed,
            },
            now,
        );
    }

    #[inline]
    fn level_number(&self) -> u32 {
        (self.level_index + 1) as u32
    }

    /// One fixed-timestep simulation step: buffered inputs first, then the
    /// system pipeline, then wave sequencing and bookkeeping.
    pub fn tick(&mut self, dt: f32, net: &NetHandle, rel: &Reliability, now: Instant) {
        for (client_id, entry) in self.inputs.drain_ready(now) {
            if let Some(slot) = self.players.get(&client_id) {
                let effects = apply_input(&mut self.registry, slot.entity, entry.mask);
                if effects.activated_powerup {
                    self.broadcast_powerup_status(client_id, net, rel, now);
                }
            }
        }

        if self.phase != SessionPhase::Running {
            return;
        }

        self.elapsed += dt;

        systems::movement_system(&mut self.registry, dt, self.elapsed, &self.log);
        systems::animation_system(&mut self.registry, dt);
        systems::weapon_cooldown_system(&mut self.registry, dt);
        systems::enemy_fire_system(&mut self.registry);
        systems::collision_system(&mut self.registry);

        let report = systems::cleanup_system(&mut self.registry, dt, &self.world, &self.log);
        self.apply_cleanup_report(report, net, rel, now);

        self.tick_powerups(dt, net, rel, now);
        self.tick_waves(dt, net, rel, now);

        if self.phase == SessionPhase::Running
            && !self.players.is_empty()
            && self.live_player_count() == 0
        {
            logging::info!(self.log, "all players destroyed, game over");
            self.end_session(net, rel, now);
        }
    }

    fn apply_cleanup_report(
        &mut self,
        report: systems::CleanupReport,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        let killed = report.enemies_killed + report.bosses_killed;
        if killed == 0 {
            return;
        }

        self.kills += killed;
        self.score += report.score;

        let ids = self.player_ids();
        rel.send_to_many(
            net,
            &ids,
            &Message::LevelProgress {
                level: self.level_number(),
                kills: self.kills,
                kills_needed: self.kills_needed,
            },
            now,
        );

        if self.kills >= self.next_powerup_at {
            self.next_powerup_at += self.powerup_threshold;
            logging::info!(self.log, "offering power-up selection"; "kills" => self.kills);
            rel.send_to_many(net, &ids, &Message::PowerUpSelection, now);
        }
    }

    fn tick_powerups(&mut self, dt: f32, net: &NetHandle, rel: &Reliability, now: Instant) {
        let bindings: Vec<(ClientId, Entity)> = self
            .players
            .iter()
            .map(|(&client_id, slot)| (client_id, slot.entity))
            .collect();

        for (client_id, entity) in bindings {
            let expired = match self.registry.get_component_mut::<PowerUp>(entity) {
                Some(powerup) if powerup.active => {
                    powerup.remaining -= dt;
                    powerup.remaining <= 0.0
                }
                _ => false,
            };

            if expired {
                let kind = self
                    .registry
                    .remove_component::<PowerUp>(entity)
                    .map(|powerup| powerup.kind);

                if let Some(kind) = kind {
                    logging::info!(self.log, "power-up expired";
                                   "client_id" => client_id,
                                   "kind" => ?kind);
                    rel.send_to_many(
                        net,
                        &self.player_ids(),
                        &Message::PowerUpStatus {
                            player_id: client_id,
                            kind: kind.wire_code(),
                            time_remaining: 0.0,
                        },
                        now,
                    );
                }
            }
        }
    }

    fn broadcast_powerup_status(
        &mut self,
        client_id: ClientId,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        let entity = match self.player_entity(client_id) {
            Some(entity) => entity,
            None => return,
        };

        if let Some(powerup) = self.registry.get_component::<PowerUp>(entity).copied() {
            rel.send_to_many(
                net,
                &self.player_ids(),
                &Message::PowerUpStatus {
                    player_id: client_id,
                    kind: powerup.kind.wire_code(),
                    time_remaining: powerup.remaining,
                },
                now,
            );
        }
    }

    fn tick_waves(&mut self, dt: f32, net: &NetHandle, rel: &Reliability, now: Instant) {
        let live = self.live_enemy_count();
        let events = match self.wave.as_mut() {
            Some(driver) => driver.tick(dt, live),
            None => return,
        };

        for event in events {
            match event {
                WaveEvent::WaveStarted { index, name } => {
                    logging::info!(self.log, "wave starting";
                                   "wave" => index,
                                   "name" => %name);
                }
                WaveEvent::SpawnEnemy { enemy_id, x, y } => {
                    let def = self
                        .wave
                        .as_ref()
                        .and_then(|driver| driver.level().enemy_definitions.get(&enemy_id))
                        .cloned();

                    match def {
                        Some(def) => {
                            factory::spawn_enemy(&mut self.registry, &def, x, y);
                        }
                        None => {
                            // The parser warned about this id at load time.
                            logging::warn!(self.log, "skipping spawn of undefined enemy";
                                           "enemy_id" => %enemy_id);
                        }
                    }
                }
                WaveEvent::SpawnBoss { enemy_id, x, y } => {
                    let def = self
                        .wave
                        .as_ref()
                        .and_then(|driver| driver.level().enemy_definitions.get(&enemy_id))
                        .cloned();

                    match def {
                        Some(def) => {
                            logging::info!(self.log, "boss incoming"; "enemy_id" => %enemy_id);
                            factory::spawn_boss(&mut self.registry, &def, x, y);
                        }
                        None => {
                            logging::warn!(self.log, "skipping spawn of undefined boss";
                                           "enemy_id" => %enemy_id);
                        }
                    }
                }
                WaveEvent::WaveCleared { index } => {
                    logging::info!(self.log, "wave cleared"; "wave" => index);
                }
                WaveEvent::LevelComplete => self.finish_level(net, rel, now),
            }
        }
    }

    fn finish_level(&mut self, net: &NetHandle, rel: &Reliability, now: Instant) {
        let completed = self.level_number();
        let ids = self.player_ids();

        if self.level_index + 1 < self.levels.len() {
            logging::info!(self.log, "level complete, advancing";
                           "completed" => completed);
            rel.send_to_many(
                net,
                &ids,
                &Message::LevelComplete {
                    completed,
                    next: completed + 1,
                },
                now,
            );
            self.level_index += 1;
            self.start_level(net, rel, now);
        } else {
            logging::info!(self.log, "campaign complete"; "completed" => completed);
            rel.send_to_many(
                net,
                &ids,
                &Message::LevelComplete {
                    completed,
                    next: completed,
                },
                now,
            );
            self.end_session(net, rel, now);
        }
    }

    fn end_session(&mut self, net: &NetHandle, rel: &Reliability, now: Instant) {
        self.phase = SessionPhase::GameOver;
        rel.send_to_many(net, &self.player_ids(), &Message::GameOver, now);
    }

    fn broadcast_lobby_status(&self, net: &NetHandle, rel: &Reliability, now: Instant) {
        let total = self.players.len() as u8;
        let ready = self.players.values().filter(|slot| slot.ready).count() as u8;

        rel.send_to_many(
            net,
            &self.player_ids(),
            &Message::LobbyStatus { total, ready },
            now,
        );
    }

    // ---- snapshots ----

    /// Full-state entity snapshot. Always complete, so a dropped frame is
    /// healed by the next one.
    pub fn build_snapshot(&self) -> Message {
        let mut entities = Vec::new();

        for (entity, (pos, tag)) in self.registry.view::<(Position, Tag)>() {
            let (kind, id) = match tag {
                Tag::Player => {
                    let client_id = self
                        .registry
                        .get_component::<NetworkBinding>(entity)
                        .map(|binding| binding.client_id)
                        .unwrap_or_else(|| entity.id());
                    (KIND_PLAYER, client_id)
                }
                Tag::Enemy => (KIND_ENEMY, entity.id()),
                Tag::Boss => (KIND_BOSS, entity.id()),
                Tag::Projectile => (KIND_PROJECTILE, entity.id()),
                Tag::Explosion => (KIND_EXPLOSION, entity.id()),
            };

            let vel = self
                .registry
                .get_component::<Velocity>(entity)
                .copied()
                .unwrap_or_default();
            let (hp, max_hp) = self
                .registry
                .get_component::<Health>(entity)
                .map(|health| (health.current, health.maximum))
                .unwrap_or((0, 0));

            let mut flags = 0u8;
            if self.registry.has_component::<DamageFlash>(entity) {
                flags |= FLAG_DAMAGE_FLASH;
            }
            if *tag == Tag::Projectile
                && self.registry.get_component::<Owner>(entity) == Some(&Owner::EnemySide)
            {
                flags |= FLAG_ENEMY_OWNED;
            }

            entities.push(EntityState {
                id,
                kind,
                x: pos.x,
                y: pos.y,
                vx: vel.vx,
                vy: vel.vy,
                hp,
                max_hp,
                flags,
            });
        }

        // The frame counts entities in a single byte.
        if entities.len() > 255 {
            logging::debug!(self.log, "snapshot truncated"; "entities" => entities.len());
            entities.truncate(255);
        }

        Message::EntityPositions { entities }
    }

    pub fn broadcast_snapshot(&self, net: &NetHandle) {
        net.broadcast(&self.build_snapshot().encode_unreliable());
    }

    // ---- client disposal ----

    fn remove_player(&mut self, client_id: ClientId, rel: &Reliability) {
        if let Some(slot) = self.players.remove(&client_id) {
            self.registry.kill(slot.entity);
            logging::info!(self.log, "player removed";
                           "client_id" => client_id,
                           "name" => %slot.name);
        }
        self.inputs.remove_client(client_id);
        rel.remove_client(client_id);
    }

    /// Disposes all per-client state for evicted clients.
    pub fn evict(&mut self, client_ids: &[ClientId], rel: &Reliability) {
        for &client_id in client_ids {
            logging::info!(self.log, "evicting inactive client"; "client_id" => client_id);
            self.remove_player(client_id, rel);
        }
    }

    /// Graceful shutdown notice to every connected player.
    pub fn shutdown(&mut self, net: &NetHandle, rel: &Reliability, now: Instant) {
        let ids = self.player_ids();
        rel.send_to_many(net, &ids, &Message::GameOver, now);
        rel.send_to_many(net, &ids, &Message::Disconnect, now);
        self.phase = SessionPhase::GameOver;
    }

    // ---- admin surface ----

    fn handle_admin_login(&mut self, sender: SocketAddr, password: &str, net: &NetHandle) {
        let accepted = !self.admin_password.is_empty() && password == self.admin_password;

        if accepted {
            self.admin_endpoints.insert(sender);
            logging::info!(self.log, "admin authenticated"; "endpoint" => %sender);
        } else {
            logging::warn!(self.log, "admin login rejected"; "endpoint" => %sender);
        }

        let result = if accepted { "OK" } else { "FAIL" };
        net.send_to_endpoint(
            sender,
            Message::AdminLoginAck {
                result: result.into(),
            }
            .encode_unreliable(),
        );
    }

    fn handle_admin_command(
        &mut self,
        sender: SocketAddr,
        command: &str,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) {
        let body = if !self.admin_endpoints.contains(&sender) {
            "ERR|not authenticated".to_string()
        } else {
            self.execute_admin_command(AdminCommand::parse(command), net, rel, now)
        };

        net.send_to_endpoint(sender, Message::AdminResponse { body }.encode_unreliable());
    }

    fn execute_admin_command(
        &mut self,
        command: AdminCommand,
        net: &NetHandle,
        rel: &Reliability,
        now: Instant,
    ) -> String {
        match command {
            AdminCommand::ListPlayers => {
                if self.players.is_empty() {
                    return "no players".into();
                }

                let records: Vec<String> = self
                    .players
                    .iter()
                    .map(|(client_id, slot)| {
                        let hp = self
                            .registry
                            .get_component::<Health>(slot.entity)
                            .map(|health| health.current)
                            .unwrap_or(0);
                        admin::record(&[
                            client_id.to_string(),
                            slot.name.clone(),
                            hp.to_string(),
                            (if slot.ready { "ready" } else { "waiting" }).to_string(),
                        ])
                    })
                    .collect();

                admin::body(&records)
            }
            AdminCommand::Status => {
                let phase = match self.phase {
                    SessionPhase::Lobby => "lobby",
                    SessionPhase::Running => "running",
                    SessionPhase::GameOver => "game-over",
                };
                admin::record(&[
                    phase.to_string(),
                    self.players.len().to_string(),
                    self.level_number().to_string(),
                    self.wave
                        .as_ref()
                        .map(|driver| driver.wave_index().to_string())
                        .unwrap_or_else(|| "-".into()),
                    self.registry.live_count().to_string(),
                    self.kills.to_string(),
                    self.score.to_string(),
                ])
            }
            AdminCommand::Kick(client_id) => {
                if self.players.contains_key(&client_id) {
                    self.remove_player(client_id, rel);
                    net.remove_client(client_id);
                    format!("OK|kicked {}", client_id)
                } else {
                    format!("ERR|unknown client {}", client_id)
                }
            }
            AdminCommand::CloseLobby => {
                logging::info!(self.log, "admin closed the session");
                self.end_session(net, rel, now);
                "OK|session closed".into()
            }
            AdminCommand::Unknown(input) => format!("ERR|unknown command {}", input),
        }
    }

    #[cfg(test)]
    pub fn buffered_input_len(&self, client_id: ClientId) -> usize {
        self.inputs.buffered_len(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{EnemySpawnConfig, WaveConfig};
    use graviton::net::{ReliabilityConfig, UdpTransport};
    use photon::wire::InputMask;
    use std::time::Duration;

    struct Harness {
        session: GameSession,
        net: NetHandle,
        rel: Reliability,
        inbound: Arc<SafeQueue<NetworkPacket>>,
        // Keeps the bound socket (and with it the shared registries) alive.
        _transport: UdpTransport,
        t0: Instant,
    }

    use std::sync::Arc;

    fn test_level() -> LevelConfig {
        let mut level = LevelConfig::default();
        level.metadata.id = "test".into();
        level.metadata.name = "Test Level".into();

        let mut drone = crate::level::EnemyConfig::default();
        drone.id = "drone".into();
        drone.health = 10;
        level.enemy_definitions.insert("drone".into(), drone);

        let mut overlord = crate::level::EnemyConfig::default();
        overlord.id = "overlord".into();
        overlord.health = 50;
        level.enemy_definitions.insert("overlord".into(), overlord);

        level.waves.push(WaveConfig {
            name: "opener".into(),
            wave_delay: 0.5,
            enemies: vec![EnemySpawnConfig {
                enemy_id: "drone".into(),
                count: 3,
                spawn_delay: 0.5,
                ..EnemySpawnConfig::default()
            }],
            ..WaveConfig::default()
        });
        level.waves.push(WaveConfig {
            name: "finale".into(),
            wave_delay: 0.5,
            is_boss_wave: true,
            enemies: vec![EnemySpawnConfig {
                enemy_id: "overlord".into(),
                count: 1,
                ..EnemySpawnConfig::default()
            }],
            ..WaveConfig::default()
        });

        level
    }

    fn harness() -> Harness {
        let log = logging::discard();
        let config = GameConfig::default();
        let transport = UdpTransport::bind(Some("127.0.0.1"), 0, &log).unwrap();

        Harness {
            session: GameSession::new(&config, vec![test_level()], &log),
            net: transport.handle(),
            rel: Reliability::new(ReliabilityConfig::default(), &log),
            inbound: transport.inbound(),
            _transport: transport,
            t0: Instant::now(),
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    impl Harness {
        fn push(&self, sender: SocketAddr, bytes: Vec<u8>) {
            self.inbound.push(NetworkPacket { data: bytes, sender });
        }

        fn pump(&mut self, now: Instant) {
            self.session
                .process_inbound(&self.inbound, &self.net, &self.rel, now);
        }

        fn tick(&mut self, now: Instant) {
            self.session.tick(1.0 / 60.0, &self.net, &self.rel, now);
        }

        fn join(&mut self, sender: SocketAddr, name: &str, seq: u32, now: Instant) -> ClientId {
            self.push(
                sender,
                Message::Login {
                    player_name: name.into(),
                }
                .encode_reliable(seq),
            );
            self.pump(now);
            self.net.client_id_of(&sender).unwrap()
        }

        fn ready(&mut self, sender: SocketAddr, seq: u32, now: Instant) {
            self.push(sender, Message::Ready { flag: true }.encode_reliable(seq));
            self.pump(now);
        }

        fn snapshot_entities(&self) -> Vec<EntityState> {
            match self.session.build_snapshot() {
                Message::EntityPositions { entities } => entities,
                other => panic!("unexpected snapshot message {:?}", other),
            }
        }
    }

    #[test]
    fn test_login_assigns_id_and_spawns_player() {
        let mut h = harness();
        let t0 = h.t0;

        let client_id = h.join(addr(40001), "alice", 1, t0);
        assert_eq!(client_id, 1);

        assert_eq!(h.session.player_count(), 1);
        let entity = h.session.player_entity(1).unwrap();
        let pos = h.session.registry().get_component::<Position>(entity).unwrap();
        assert_eq!((pos.x, pos.y), (factory::PLAYER_SPAWN_X, factory::PLAYER_SPAWN_Y));

        // The LoginAck (and lobby status) are pending until acked.
        assert!(h.rel.has_pending());

        // The next broadcast lists exactly one player, under the client id.
        let entities = h.snapshot_entities();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].kind, KIND_PLAYER);
        assert_eq!(entities[0].id, 1);
        assert_eq!(entities[0].hp, factory::PLAYER_HEALTH);
    }

    #[test]
    fn test_duplicate_login_is_single_player() {
        let mut h = harness();
        let t0 = h.t0;

        h.join(addr(40001), "alice", 1, t0);
        // Retransmitted login (same seq) is deduplicated by the flow.
        h.push(
            addr(40001),
            Message::Login {
                player_name: "alice".into(),
            }
            .encode_reliable(1),
        );
        h.pump(t0 + Duration::from_millis(10));

        assert_eq!(h.session.player_count(), 1);
    }

    #[test]
    fn test_input_before_login_dropped() {
        let mut h = harness();
        let t0 = h.t0;

        h.push(
            addr(40009),
            Message::Input {
                mask: InputMask(InputMask::RIGHT),
                client_timestamp: 0,
            }
            .encode_unreliable(),
        );
        h.pump(t0);

        assert_eq!(h.session.player_count(), 0);
        let client_id = h.net.client_id_of(&addr(40009)).unwrap();
        assert_eq!(h.session.buffered_input_len(client_id), 0);
    }

    #[test]
    fn test_input_delay_uniform_across_clients() {
        let mut h = harness();
        let t0 = h.t0;
        let ms = Duration::from_millis;

        let a = h.join(addr(40001), "alice", 1, t0);
        let b = h.join(addr(40002), "bob", 1, t0);
        h.ready(addr(40001), 2, t0);
        h.ready(addr(40002), 2, t0);
        assert_eq!(h.session.phase(), SessionPhase::Running);

        let input = Message::Input {
            mask: InputMask(InputMask::RIGHT),
            client_timestamp: 0,
        };

        // A's input arrives at t0, B's 20 ms later.
        h.push(addr(40001), input.encode_unreliable());
        h.pump(t0);
        h.push(addr(40002), input.encode_unreliable());
        h.pump(t0 + ms(20));

        let pos_of = |h: &Harness, id: ClientId| {
            let entity = h.session.player_entity(id).unwrap();
            h.session
                .registry()
                .get_component::<Position>(entity)
                .unwrap()
                .x
        };
        let ax0 = pos_of(&h, a);
        let bx0 = pos_of(&h, b);

        // 55 ms in: only A's input has served its 50 ms delay.
        h.tick(t0 + ms(55));
        let dt = 1.0 / 60.0;
        assert!((pos_of(&h, a) - ax0 - factory::PLAYER_SPEED * dt).abs() < 1e-3);
        assert_eq!(pos_of(&h, b), bx0);

        // 75 ms in: B's has too.
        h.tick(t0 + ms(75));
        assert!(pos_of(&h, b) > bx0);
    }

    #[test]
    fn test_full_level_run_to_game_over() {
        let mut h = harness();
        let t0 = h.t0;

        h.join(addr(40001), "alice", 1, t0);
        h.ready(addr(40001), 2, t0);
        assert_eq!(h.session.phase(), SessionPhase::Running);
        assert_eq!(h.session.wave_phase(), Some(WavePhase::AwaitingWave));

        let mut now = t0;
        let mut advance = |h: &mut Harness, now: &mut Instant, seconds: f32| {
            let ticks = (seconds * 60.0).ceil() as u32;
            for _ in 0..ticks {
                *now += Duration::from_micros(16_667);
                h.tick(*now);
            }
        };

        // Wave delay plus three spawns at 0.5 s apart.
        advance(&mut h, &mut now, 2.2);
        assert_eq!(h.session.live_enemy_count(), 3);

        // Obliterate the drones; the wave drains and the boss wave arms.
        let drones: Vec<Entity> = h
            .session
            .registry()
            .view::<(Tag,)>()
            .filter(|(_, (tag,))| **tag == Tag::Enemy)
            .map(|(entity, _)| entity)
            .collect();
        for drone in drones {
            h.session
                .registry_mut()
                .get_component_mut::<Health>(drone)
                .unwrap()
                .current = 0;
        }

        advance(&mut h, &mut now, 1.0);
        assert_eq!(
            h.session
                .registry()
                .view::<(Tag,)>()
                .filter(|(_, (tag,))| **tag == Tag::Boss)
                .count(),
            1
        );
        assert_eq!(h.session.kills(), 3);

        // Boss down: single-level campaign ends the session.
        let boss = h
            .session
            .registry()
            .view::<(Tag,)>()
            .find(|(_, (tag,))| **tag == Tag::Boss)
            .map(|(entity, _)| entity)
            .unwrap();
        h.session
            .registry_mut()
            .get_component_mut::<Health>(boss)
            .unwrap()
            .current = 0;

        advance(&mut h, &mut now, 0.5);
        assert_eq!(h.session.kills(), 4);
        assert_eq!(h.session.phase(), SessionPhase::GameOver);
    }

    #[test]
    fn test_powerup_choice_activation_expiry() {
        let mut h = harness();
        let t0 = h.t0;

        h.join(addr(40001), "alice", 1, t0);
        h.ready(addr(40001), 2, t0);

        h.push(addr(40001), Message::PowerUpChoice { choice: 1 }.encode_reliable(3));
        h.pump(t0);

        let entity = h.session.player_entity(1).unwrap();
        let held = h.session.registry().get_component::<PowerUp>(entity).unwrap();
        assert_eq!(held.kind, PowerUpKind::PowerCannon);
        assert!(!held.active);

        h.push(addr(40001), Message::PowerUpActivate.encode_reliable(4));
        h.pump(t0);
        assert!(h.session.registry().get_component::<PowerUp>(entity).unwrap().active);

        // Run out the timer; the component drops off.
        let mut now = t0;
        for _ in 0..((PowerUp::DURATION * 60.0) as u32 + 5) {
            now += Duration::from_micros(16_667);
            h.tick(now);
        }
        assert!(!h.session.registry().has_component::<PowerUp>(entity));
    }

    #[test]
    fn test_admin_auth_and_kick() {
        let mut h = harness();
        let t0 = h.t0;
        let admin = addr(40100);

        h.join(addr(40001), "alice", 1, t0);

        // Wrong password: commands stay locked.
        h.push(
            admin,
            Message::AdminLogin {
                password: "wrong".into(),
            }
            .encode_unreliable(),
        );
        h.push(
            admin,
            Message::AdminCommand {
                command: "kick 1".into(),
            }
            .encode_unreliable(),
        );
        h.pump(t0);
        assert_eq!(h.session.player_count(), 1);

        // Correct password (the default config's), then the kick lands.
        h.push(
            admin,
            Message::AdminLogin {
                password: "admin".into(),
            }
            .encode_unreliable(),
        );
        h.push(
            admin,
            Message::AdminCommand {
                command: "kick 1".into(),
            }
            .encode_unreliable(),
        );
        h.pump(t0);
        assert_eq!(h.session.player_count(), 0);
    }

    #[test]
    fn test_eviction_disposes_player_state() {
        let mut h = harness();
        let t0 = h.t0;

        let client_id = h.join(addr(40001), "alice", 1, t0);
        let entity = h.session.player_entity(client_id).unwrap();

        h.session.evict(&[client_id], &h.rel);

        assert_eq!(h.session.player_count(), 0);
        assert!(!h.session.registry().is_alive(entity));
        assert!(h.snapshot_entities().is_empty());
    }

    #[test]
    fn test_reordered_reliable_frames_apply_in_order() {
        let mut h = harness();
        let t0 = h.t0;

        // Ready (seq 2) arrives before Login (seq 1): the flow buffers it
        // and the session still sees login first.
        h.push(addr(40001), Message::Ready { flag: true }.encode_reliable(2));
        h.pump(t0);
        assert_eq!(h.session.player_count(), 0);

        h.push(
            addr(40001),
            Message::Login {
                player_name: "alice".into(),
            }
            .encode_reliable(1),
        );
        h.pump(t0 + Duration::from_millis(5));

        assert_eq!(h.session.player_count(), 1);
        // Both frames applied: the lone player readied up and the game began.
        assert_eq!(h.session.phase(), SessionPhase::Running);
    }
}
