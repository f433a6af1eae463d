//! Typed schema of a level definition file. Every struct deserializes with
//! defaults so missing fields never fail a load, and unknown fields are
//! ignored for forward compatibility.

use hashbrown::HashMap;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteConfig {
    pub texture_path: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_count: u32,
    pub frame_duration: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub rotation: f32,
}

impl Default for SpriteConfig {
    fn default() -> SpriteConfig {
        SpriteConfig {
            texture_path: String::new(),
            frame_width: 32,
            frame_height: 32,
            frame_count: 1,
            frame_duration: 0.1,
            scale_x: 1.0,
            scale_y: 1.0,
            mirror_x: false,
            mirror_y: false,
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub sprite: SpriteConfig,
    pub speed: f32,
    pub damage: i32,
    pub fire_rate: f32,
}

impl Default for ProjectileConfig {
    fn default() -> ProjectileConfig {
        ProjectileConfig {
            kind: "basic".into(),
            sprite: SpriteConfig::default(),
            speed: 400.0,
            damage: 10,
            fire_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Linear,
    Sine,
    Zigzag,
    Waypoints,
    Unknown,
}

// Unrecognized pattern names deserialize to `Unknown` instead of failing
// the whole level, so newer files still load on older servers.
impl<'de> serde::Deserialize<'de> for MovementKind {
    fn deserialize<D>(deserializer: D) -> Result<MovementKind, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "linear" => MovementKind::Linear,
            "sine" => MovementKind::Sine,
            "zigzag" => MovementKind::Zigzag,
            "waypoints" => MovementKind::Waypoints,
            _ => MovementKind::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementPatternConfig {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    pub amplitude: f32,
    pub frequency: f32,
    pub phase: f32,
    pub period: f32,
    pub waypoints: Vec<[f32; 2]>,
}

impl Default for MovementPatternConfig {
    fn default() -> MovementPatternConfig {
        MovementPatternConfig {
            kind: MovementKind::Linear,
            amplitude: 0.0,
            frequency: 0.0,
            phase: 0.0,
            period: 2.0,
            waypoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub movement: MovementPatternConfig,
    pub tracks_player: bool,
    pub tracking_speed: f32,
    pub aggro_range: f32,
}

impl Default for BehaviorConfig {
    fn default() -> BehaviorConfig {
        BehaviorConfig {
            movement: MovementPatternConfig::default(),
            tracks_player: false,
            tracking_speed: 0.0,
            aggro_range: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    None,
    Straight,
    /// Alias kept for older level files; behaves like `straight`.
    Front,
    Targeted,
    Spread,
    Unknown,
}

impl<'de> serde::Deserialize<'de> for AttackKind {
    fn deserialize<D>(deserializer: D) -> Result<AttackKind, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "none" => AttackKind::None,
            "straight" => AttackKind::Straight,
            "front" => AttackKind::Front,
            "targeted" => AttackKind::Targeted,
            "spread" => AttackKind::Spread,
            _ => AttackKind::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackPatternConfig {
    #[serde(rename = "type")]
    pub kind: AttackKind,
    /// Seconds between volleys.
    pub cooldown: f32,
    pub burst_count: u32,
    pub burst_delay: f32,
    pub spread_angle: f32,
    pub projectile_count: u32,
    pub aim_at_player: bool,
    pub projectile: ProjectileConfig,
}

impl Default for AttackPatternConfig {
    fn default() -> AttackPatternConfig {
        AttackPatternConfig {
            kind: AttackKind::None,
            cooldown: 2.0,
            burst_count: 1,
            burst_delay: 0.1,
            spread_angle: 30.0,
            projectile_count: 1,
            aim_at_player: false,
            projectile: ProjectileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyConfig {
    pub id: String,
    pub name: String,
    pub sprite: SpriteConfig,
    pub health: i32,
    pub speed: f32,
    pub damage: i32,
    pub score_value: u32,
    pub behavior: BehaviorConfig,
    pub attack: AttackPatternConfig,
}

impl Default for EnemyConfig {
    fn default() -> EnemyConfig {
        EnemyConfig {
            id: String::new(),
            name: String::new(),
            sprite: SpriteConfig::default(),
            health: 100,
            speed: 100.0,
            damage: 10,
            score_value: 100,
            behavior: BehaviorConfig::default(),
            attack: AttackPatternConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPositionKind {
    Absolute,
    /// Just past the right screen edge, with offsets applied.
    ScreenRight,
    Unknown,
}

impl<'de> serde::Deserialize<'de> for SpawnPositionKind {
    fn deserialize<D>(deserializer: D) -> Result<SpawnPositionKind, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "absolute" => SpawnPositionKind::Absolute,
            "screen_right" => SpawnPositionKind::ScreenRight,
            _ => SpawnPositionKind::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnPointConfig {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "position_type")]
    pub kind: SpawnPositionKind,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for SpawnPointConfig {
    fn default() -> SpawnPointConfig {
        SpawnPointConfig {
            x: 0.0,
            y: 0.0,
            kind: SpawnPositionKind::ScreenRight,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemySpawnConfig {
    pub enemy_id: String,
    pub count: u32,
    /// Seconds between spawns within the group.
    pub spawn_delay: f32,
    pub spawn_point: SpawnPointConfig,
    pub formation: Option<String>,
}

impl Default for EnemySpawnConfig {
    fn default() -> EnemySpawnConfig {
        EnemySpawnConfig {
            enemy_id: String::new(),
            count: 1,
            spawn_delay: 0.5,
            spawn_point: SpawnPointConfig::default(),
            formation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub wave_number: u32,
    pub name: String,
    /// Spawn groups, consumed in declared order.
    pub enemies: Vec<EnemySpawnConfig>,
    /// Seconds before the wave begins.
    pub wave_delay: f32,
    pub is_boss_wave: bool,
}

impl Default for WaveConfig {
    fn default() -> WaveConfig {
        WaveConfig {
            wave_number: 0,
            name: String::new(),
            enemies: Vec::new(),
            wave_delay: 2.0,
            is_boss_wave: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerupSpawnConfig {
    pub powerup_type: String,
    pub spawn_chance: f32,
    pub spawn_on_wave: Option<u32>,
}

impl Default for PowerupSpawnConfig {
    fn default() -> PowerupSpawnConfig {
        PowerupSpawnConfig {
            powerup_type: String::new(),
            spawn_chance: 0.1,
            spawn_on_wave: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub background: String,
    pub scroll_speed: f32,
    pub scroll_infinite: bool,
    pub background_static: bool,
    pub music: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> EnvironmentConfig {
        EnvironmentConfig {
            background: String::new(),
            scroll_speed: 50.0,
            scroll_infinite: true,
            background_static: false,
            music: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LevelMetadata {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub description: String,
    pub difficulty: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LevelConfig {
    pub metadata: LevelMetadata,
    pub environment: EnvironmentConfig,
    pub enemy_definitions: HashMap<String, EnemyConfig>,
    pub waves: Vec<WaveConfig>,
    pub powerups: Vec<PowerupSpawnConfig>,
    pub max_players: Option<u32>,
    pub time_limit: Option<f32>,
    pub lives: Option<u32>,
}

impl LevelConfig {
    /// Total number of enemies the level will ever spawn, counting only
    /// groups whose enemy id resolves.
    pub fn total_enemy_count(&self) -> u32 {
        self.waves
            .iter()
            .flat_map(|wave| wave.enemies.iter())
            .filter(|group| self.enemy_definitions.contains_key(&group.enemy_id))
            .map(|group| group.count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_parsing_tolerant() {
        let attack: AttackKind = serde_json::from_str("\"targeted\"").unwrap();
        assert_eq!(attack, AttackKind::Targeted);

        let attack: AttackKind = serde_json::from_str("\"laser_beam\"").unwrap();
        assert_eq!(attack, AttackKind::Unknown);

        let movement: MovementKind = serde_json::from_str("\"sine\"").unwrap();
        assert_eq!(movement, MovementKind::Sine);

        let spawn: SpawnPositionKind = serde_json::from_str("\"screen_right\"").unwrap();
        assert_eq!(spawn, SpawnPositionKind::ScreenRight);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let enemy: EnemyConfig = serde_json::from_str(r#"{"id": "drone"}"#).unwrap();

        assert_eq!(enemy.id, "drone");
        assert_eq!(enemy.health, 100);
        assert_eq!(enemy.sprite.frame_width, 32);
        assert_eq!(enemy.attack.kind, AttackKind::None);
        assert_eq!(enemy.behavior.movement.kind, MovementKind::Linear);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let wave: WaveConfig =
            serde_json::from_str(r#"{"name": "w1", "music_override": "boss.ogg"}"#).unwrap();

        assert_eq!(wave.name, "w1");
        assert_eq!(wave.wave_delay, 2.0);
    }

    #[test]
    fn test_total_enemy_count_skips_unresolved() {
        let mut level = LevelConfig::default();
        level
            .enemy_definitions
            .insert("drone".into(), EnemyConfig::default());
        level.waves.push(WaveConfig {
            enemies: vec![
                EnemySpawnConfig {
                    enemy_id: "drone".into(),
                    count: 3,
                    ..EnemySpawnConfig::default()
                },
                EnemySpawnConfig {
                    enemy_id: "ghost".into(),
                    count: 5,
                    ..EnemySpawnConfig::default()
                },
            ],
            ..WaveConfig::default()
        });

        assert_eq!(level.total_enemy_count(), 3);
    }
}
