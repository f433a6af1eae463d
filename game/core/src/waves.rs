//! Wave sequencing. The driver is a pure state machine over the level
//! definition: it consumes tick time plus the live-enemy count and emits
//! spawn/completion events for the session to execute, which keeps it
//! fully testable without a registry.

use crate::level::{LevelConfig, SpawnPointConfig, SpawnPositionKind, WaveConfig};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// X coordinate just past the right screen edge where enemies enter.
const SCREEN_RIGHT_X: f32 = 1950.0;
const SCREEN_CENTER_Y: f32 = 540.0;
/// Vertical band for jittered screen-right spawns.
const SPAWN_Y_MIN: f32 = 100.0;
const SPAWN_Y_MAX: f32 = 900.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    /// Counting down the wave delay.
    AwaitingWave,
    /// Emitting one enemy per spawn delay, group by group.
    SpawningGroup,
    /// All groups spawned; waiting for the field to clear.
    DrainingWave,
    /// Spawning the single boss of a boss wave.
    BossWave,
    /// Terminal.
    LevelComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaveEvent {
    WaveStarted { index: usize, name: String },
    SpawnEnemy { enemy_id: String, x: f32, y: f32 },
    SpawnBoss { enemy_id: String, x: f32, y: f32 },
    WaveCleared { index: usize },
    LevelComplete,
}

pub struct WaveDriver {
    level: LevelConfig,
    phase: WavePhase,
    wave_index: usize,
    wave_timer: f32,
    spawn_timer: f32,
    group_index: usize,
    spawned_in_group: u32,
    rng: SmallRng,
}

impl WaveDriver {
    pub fn new(level: LevelConfig, seed: u64) -> WaveDriver {
        WaveDriver {
            level,
            phase: WavePhase::AwaitingWave,
            wave_index: 0,
            wave_timer: 0.0,
            spawn_timer: 0.0,
            group_index: 0,
            spawned_in_group: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn phase(&self) -> WavePhase {
        self.phase
    }

    #[inline]
    pub fn wave_index(&self) -> usize {
        self.wave_index
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.phase == WavePhase::LevelComplete
    }

    #[inline]
    pub fn level(&self) -> &LevelConfig {
        &self.level
    }

    fn current_wave(&self) -> &WaveConfig {
        &self.level.waves[self.wave_index]
    }

    fn resolve_spawn_point(&mut self, point: &SpawnPointConfig) -> (f32, f32) {
        match point.kind {
            SpawnPositionKind::Absolute => (point.x, point.y),
            _ => {
                // Screen-right entry; zero y offset means a jittered lane.
                let x = SCREEN_RIGHT_X + point.offset_x;
                let y = if point.offset_y == 0.0 {
                    self.rng.gen_range(SPAWN_Y_MIN..SPAWN_Y_MAX)
                } else {
                    SCREEN_CENTER_Y + point.offset_y
                };
                (x, y)
            }
        }
    }

    /// Advances the state machine by one tick. `live_enemies` is the count
    /// of enemy/boss entities currently alive in the simulation; spawns
    /// emitted from this call are expected to be executed before the next
    /// one.
    pub fn tick(&mut self, dt: f32, live_enemies: usize) -> Vec<WaveEvent> {
        let mut events = Vec::new();

        match self.phase {
            WavePhase::AwaitingWave => {
                self.wave_timer += dt;
                if self.wave_timer >= self.current_wave().wave_delay {
                    self.wave_timer = 0.0;
                    self.spawn_timer = 0.0;
                    self.group_index = 0;
                    self.spawned_in_group = 0;

                    events.push(WaveEvent::WaveStarted {
                        index: self.wave_index,
                        name: self.current_wave().name.clone(),
                    });

                    self.phase = if self.current_wave().is_boss_wave {
                        WavePhase::BossWave
                    } else {
                        WavePhase::SpawningGroup
                    };
                }
            }

            WavePhase::SpawningGroup => {
                let wave = self.current_wave().clone();

                if self.group_index >= wave.enemies.len() {
                    self.phase = WavePhase::DrainingWave;
                    return events;
                }

                let group = &wave.enemies[self.group_index];
                self.spawn_timer += dt;

                if group.spawn_delay <= f32::EPSILON {
                    // Instant groups dump their remainder in one tick.
                    while self.spawned_in_group < group.count {
                        let (x, y) = self.resolve_spawn_point(&group.spawn_point);
                        events.push(WaveEvent::SpawnEnemy {
                            enemy_id: group.enemy_id.clone(),
                            x,
                            y,
                        });
                        self.spawned_in_group += 1;
                    }
                } else {
                    while self.spawn_timer >= group.spawn_delay
                        && self.spawned_in_group < group.count
                    {
                        self.spawn_timer -= group.spawn_delay;
                        let (x, y) = self.resolve_spawn_point(&group.spawn_point);
                        events.push(WaveEvent::SpawnEnemy {
                            enemy_id: group.enemy_id.clone(),
                            x,
                            y,
                        });
                        self.spawned_in_group += 1;
                    }
                }

                if self.spawned_in_group >= group.count {
                    self.group_index += 1;
                    self.spawned_in_group = 0;
                    self.spawn_timer = 0.0;

                    if self.group_index >= wave.enemies.len() {
                        self.phase = WavePhase::DrainingWave;
                    }
                }
            }

            WavePhase::BossWave => {
                if self.spawned_in_group == 0 {
                    if let Some(group) = self.current_wave().enemies.first() {
                        let enemy_id = group.enemy_id.clone();
                        let point = group.spawn_point.clone();
                        let (x, y) = match point.kind {
                            SpawnPositionKind::Absolute if point.x != 0.0 || point.y != 0.0 => {
                                (point.x, point.y)
                            }
                            _ => (SCREEN_RIGHT_X, SCREEN_CENTER_Y),
                        };
                        events.push(WaveEvent::SpawnBoss { enemy_id, x, y });
                        self.spawned_in_group = 1;
                    }
                }
                self.phase = WavePhase::DrainingWave;
            }

            WavePhase::DrainingWave => {
                if live_enemies == 0 {
                    events.push(WaveEvent::WaveCleared {
                        index: self.wave_index,
                    });

                    self.wave_index += 1;
                    self.wave_timer = 0.0;
                    self.spawned_in_group = 0;

                    if self.wave_index >= self.level.waves.len() {
                        self.phase = WavePhase::LevelComplete;
                        events.push(WaveEvent::LevelComplete);
                    } else {
                        self.phase = WavePhase::AwaitingWave;
                    }
                }
            }

            WavePhase::LevelComplete => {}
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{EnemyConfig, EnemySpawnConfig};

    fn level_two_waves() -> LevelConfig {
        let mut level = LevelConfig::default();
        level.metadata.id = "test".into();
        level.metadata.name = "Test".into();
        level
            .enemy_definitions
            .insert("drone".into(), EnemyConfig::default());
        level
            .enemy_definitions
            .insert("overlord".into(), EnemyConfig::default());

        level.waves.push(WaveConfig {
            name: "opener".into(),
            wave_delay: 1.0,
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
            wave_delay: 1.0,
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

    fn spawn_events(events: &[WaveEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, WaveEvent::SpawnEnemy { .. }))
            .count()
    }

    #[test]
    fn test_wave_delay_countdown() {
        let mut driver = WaveDriver::new(level_two_waves(), 7);

        assert!(driver.tick(0.5, 0).is_empty());
        assert_eq!(driver.phase(), WavePhase::AwaitingWave);

        let events = driver.tick(0.5, 0);
        assert!(matches!(events[0], WaveEvent::WaveStarted { index: 0, .. }));
        assert_eq!(driver.phase(), WavePhase::SpawningGroup);
    }

    #[test]
    fn test_group_spawn_cadence() {
        let mut driver = WaveDriver::new(level_two_waves(), 7);
        driver.tick(1.0, 0);

        // One spawn each 0.5 s, three in total.
        assert_eq!(spawn_events(&driver.tick(0.5, 0)), 1);
        assert_eq!(spawn_events(&driver.tick(0.25, 1)), 0);
        assert_eq!(spawn_events(&driver.tick(0.25, 1)), 1);
        assert_eq!(spawn_events(&driver.tick(0.5, 2)), 1);
        assert_eq!(driver.phase(), WavePhase::DrainingWave);
    }

    #[test]
    fn test_full_level_with_boss() {
        let mut driver = WaveDriver::new(level_two_waves(), 7);

        // Wave 1: delay, then 3 drones over 1.5 s.
        driver.tick(1.0, 0);
        let mut spawned = 0;
        for _ in 0..3 {
            spawned += spawn_events(&driver.tick(0.5, spawned));
        }
        assert_eq!(spawned, 3);
        assert_eq!(driver.phase(), WavePhase::DrainingWave);

        // Field still populated: nothing happens.
        assert!(driver.tick(0.1, 3).is_empty());

        // All drones die: wave cleared, next wave pending.
        let events = driver.tick(0.1, 0);
        assert!(matches!(events[0], WaveEvent::WaveCleared { index: 0 }));
        assert_eq!(driver.phase(), WavePhase::AwaitingWave);

        // Boss wave: delay, then exactly one boss.
        let events = driver.tick(1.0, 0);
        assert!(matches!(events[0], WaveEvent::WaveStarted { index: 1, .. }));
        assert_eq!(driver.phase(), WavePhase::BossWave);

        let events = driver.tick(0.016, 0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WaveEvent::SpawnBoss { .. }));
        assert_eq!(driver.phase(), WavePhase::DrainingWave);

        // Boss alive: still draining. Boss dead: level complete.
        assert!(driver.tick(0.1, 1).is_empty());
        let events = driver.tick(0.1, 0);
        assert!(events.contains(&WaveEvent::WaveCleared { index: 1 }));
        assert!(events.contains(&WaveEvent::LevelComplete));
        assert!(driver.is_complete());

        // Terminal state stays put.
        assert!(driver.tick(1.0, 0).is_empty());
    }

    #[test]
    fn test_groups_consumed_in_declared_order() {
        let mut level = level_two_waves();
        level.waves[0].enemies.push(EnemySpawnConfig {
            enemy_id: "overlord".into(),
            count: 1,
            spawn_delay: 0.5,
            ..EnemySpawnConfig::default()
        });

        let mut driver = WaveDriver::new(level, 7);
        driver.tick(1.0, 0);

        let mut ids = Vec::new();
        for _ in 0..8 {
            for event in driver.tick(0.5, 0) {
                if let WaveEvent::SpawnEnemy { enemy_id, .. } = event {
                    ids.push(enemy_id);
                }
            }
        }

        assert_eq!(ids, vec!["drone", "drone", "drone", "overlord"]);
    }

    #[test]
    fn test_spawn_jitter_deterministic_per_seed() {
        let mut a = WaveDriver::new(level_two_waves(), 42);
        let mut b = WaveDriver::new(level_two_waves(), 42);

        a.tick(1.0, 0);
        b.tick(1.0, 0);
        let ea = a.tick(0.5, 0);
        let eb = b.tick(0.5, 0);

        assert_eq!(ea, eb);
    }

    #[test]
    fn test_absolute_spawn_point() {
        let mut level = level_two_waves();
        level.waves[0].enemies[0].spawn_point = SpawnPointConfig {
            x: 1700.0,
            y: 450.0,
            kind: SpawnPositionKind::Absolute,
            offset_x: 0.0,
            offset_y: 0.0,
        };

        let mut driver = WaveDriver::new(level, 7);
        driver.tick(1.0, 0);
        let events = driver.tick(0.5, 0);

        match &events[0] {
            WaveEvent::SpawnEnemy { x, y, .. } => {
                assert_eq!((*x, *y), (1700.0, 450.0));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
