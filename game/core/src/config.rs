use graviton::net::ReliabilityConfig;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 4242;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address; `None` or empty means `::` (dual-stack where the OS
    /// allows it).
    pub bind_address: Option<String>,
    pub port: u16,
    pub max_clients: u16,
    pub inactivity_timeout_secs: u64,
    pub admin_password: String,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            bind_address: None,
            port: DEFAULT_PORT,
            max_clients: 8,
            inactivity_timeout_secs: 30,
            admin_password: "admin".into(),
        }
    }
}

/// Axis-aligned play field. Entities drifting past the margin get culled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldRect {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl Default for WorldRect {
    fn default() -> WorldRect {
        WorldRect {
            width: 1920.0,
            height: 1080.0,
            margin: 200.0,
        }
    }
}

impl WorldRect {
    /// True when the point lies beyond the play field by more than the
    /// cull margin.
    #[inline]
    pub fn out_of_bounds(&self, x: f32, y: f32) -> bool {
        x < -self.margin
            || x > self.width + self.margin
            || y < -self.margin
            || y > self.height + self.margin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub tick_rate: u32,
    pub snapshot_interval_ms: u64,
    pub input_delay_ms: u64,
    pub level_dir: String,
    pub world: WorldRect,
    /// Kills between power-up selection offers.
    pub powerup_kill_threshold: u32,
    /// Seed for spawn-position jitter; fixed seed makes runs reproducible.
    pub spawn_seed: u64,
}

impl Default for GameSettings {
    fn default() -> GameSettings {
        GameSettings {
            tick_rate: 60,
            snapshot_interval_ms: 100,
            input_delay_ms: 50,
            level_dir: "levels".into(),
            world: WorldRect::default(),
            powerup_kill_threshold: 10,
            spawn_seed: 0x5EED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityTuning {
    pub max_retries: u32,
    pub retry_timeout_ms: u64,
    pub reorder_window: u32,
    pub reorder_grace_ms: u64,
    pub duplicate_cache_size: usize,
    pub duplicate_ttl_ms: u64,
}

impl Default for ReliabilityTuning {
    fn default() -> ReliabilityTuning {
        let defaults = ReliabilityConfig::default();
        ReliabilityTuning {
            max_retries: defaults.max_retries,
            retry_timeout_ms: defaults.retry_timeout.as_millis() as u64,
            reorder_window: defaults.reorder_window,
            reorder_grace_ms: defaults.reorder_grace.as_millis() as u64,
            duplicate_cache_size: defaults.duplicate_cache_size,
            duplicate_ttl_ms: defaults.duplicate_ttl.as_millis() as u64,
        }
    }
}

impl ReliabilityTuning {
    pub fn to_config(&self) -> ReliabilityConfig {
        ReliabilityConfig {
            max_retries: self.max_retries,
            retry_timeout: Duration::from_millis(self.retry_timeout_ms),
            reorder_window: self.reorder_window,
            reorder_grace: Duration::from_millis(self.reorder_grace_ms),
            duplicate_cache_size: self.duplicate_cache_size,
            duplicate_ttl: Duration::from_millis(self.duplicate_ttl_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
    pub server: ServerConfig,
    pub game: GameSettings,
    pub reliability: ReliabilityTuning,
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GameConfig, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.game.tick_rate.max(1)))
    }

    #[inline]
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.game.snapshot_interval_ms)
    }

    #[inline]
    pub fn input_delay(&self) -> Duration {
        Duration::from_millis(self.game.input_delay_ms)
    }

    #[inline]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.server.inactivity_timeout_secs)
    }
}
