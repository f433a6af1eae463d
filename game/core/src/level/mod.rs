//! Data-driven level definitions: the on-disk schema and the tolerant
//! JSON parser that turns files into validated configs.

pub mod config;
pub mod parser;

pub use self::config::{
    AttackKind, AttackPatternConfig, BehaviorConfig, EnemyConfig, EnemySpawnConfig,
    EnvironmentConfig, LevelConfig, LevelMetadata, MovementKind, MovementPatternConfig,
    PowerupSpawnConfig, ProjectileConfig, SpawnPointConfig, SpawnPositionKind, SpriteConfig,
    WaveConfig,
};
pub use self::parser::{load_level, load_level_dir, parse_level, LevelError, LoadedLevel};
