//! Component types attached to simulation entities. Everything here is
//! plain data; the systems give it behavior.

use photon::ClientId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub current: i32,
    pub maximum: i32,
}

impl Health {
    #[inline]
    pub fn new(maximum: i32) -> Health {
        Health {
            current: maximum,
            maximum,
        }
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.current <= 0
    }
}

/// Permanent weapon upgrade carried by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponUpgrade {
    Single,
    TripleShot,
    Missile,
    PowerShot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weapon {
    /// Shots per second.
    pub fire_rate: f32,
    /// Seconds until the gate opens again; counts down to zero.
    pub cooldown: f32,
    pub projectile_speed: f32,
    pub damage: i32,
    pub upgrade: WeaponUpgrade,
}

impl Weapon {
    pub fn new(fire_rate: f32, projectile_speed: f32, damage: i32) -> Weapon {
        Weapon {
            fire_rate,
            cooldown: 0.0,
            projectile_speed,
            damage,
            upgrade: WeaponUpgrade::Single,
        }
    }

    /// Builds a weapon from a seconds-between-shots interval, the way
    /// enemy attack configs express their cadence.
    pub fn with_interval(interval: f32, projectile_speed: f32, damage: i32) -> Weapon {
        let interval = if interval > 0.0 { interval } else { 2.0 };
        Weapon::new(1.0 / interval, projectile_speed, damage)
    }

    #[inline]
    pub fn tick(&mut self, dt: f32) {
        if self.cooldown > 0.0 {
            self.cooldown = (self.cooldown - dt).max(0.0);
        }
    }

    #[inline]
    pub fn can_fire(&self) -> bool {
        self.cooldown <= 0.0
    }

    #[inline]
    pub fn reset_cooldown(&mut self) {
        self.cooldown = if self.fire_rate > 0.0 {
            1.0 / self.fire_rate
        } else {
            f32::INFINITY
        };
    }
}

/// Timed power-up kinds. Permanent upgrades live on `Weapon` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUpKind {
    PowerCannon,
    Shield,
}

impl PowerUpKind {
    /// Stable byte used in `PowerUpStatus` frames.
    #[inline]
    pub fn wire_code(self) -> u8 {
        match self {
            PowerUpKind::PowerCannon => 1,
            PowerUpKind::Shield => 2,
        }
    }
}

/// A player's held or running timed power-up. One per player; choosing a
/// new one replaces whatever was there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub remaining: f32,
    pub active: bool,
}

impl PowerUp {
    pub const DURATION: f32 = 10.0;
    /// Damage multiplier while a power cannon is running.
    pub const CANNON_DAMAGE_FACTOR: i32 = 2;

    pub fn held(kind: PowerUpKind) -> PowerUp {
        PowerUp {
            kind,
            remaining: Self::DURATION,
            active: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Controllable {
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedMovement {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub width: f32,
    pub height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CollisionBox {
    pub fn new(width: f32, height: f32) -> CollisionBox {
        CollisionBox {
            width,
            height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOnContact {
    pub amount: i32,
    pub destroy_on_hit: bool,
}

/// Semantic entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Player,
    Enemy,
    Boss,
    Projectile,
    Explosion,
}

/// Which side a projectile fights for. Damage only applies across sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    PlayerSide,
    EnemySide,
}

/// Seat index of a player (0-based join order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSeat {
    pub index: u8,
}

/// Binds a player entity to the network client steering it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkBinding {
    pub client_id: ClientId,
}

/// Data-driven movement shape applied on top of plain velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementPattern {
    Linear,
    Sine {
        amplitude: f32,
        frequency: f32,
        phase: f32,
    },
    ZigZag {
        amplitude: f32,
        period: f32,
    },
}

/// Firing shape of an armed enemy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackStyle {
    Straight,
    Targeted,
    Spread { count: u32, angle_deg: f32 },
}

/// Self-destruct countdown (explosions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime {
    pub remaining: f32,
}

/// Short visual pulse after taking a hit, mirrored into snapshot flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageFlash {
    pub remaining: f32,
}

impl DamageFlash {
    pub const DURATION: f32 = 0.15;

    pub fn armed() -> DamageFlash {
        DamageFlash {
            remaining: Self::DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreValue(pub u32);

/// Server-side frame counter so all clients agree on animation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    pub frame: u32,
    pub frame_count: u32,
    pub frame_duration: f32,
    pub elapsed: f32,
}

impl Animation {
    pub fn new(frame_count: u32, frame_duration: f32) -> Animation {
        Animation {
            frame: 0,
            frame_count: frame_count.max(1),
            frame_duration: if frame_duration > 0.0 {
                frame_duration
            } else {
                0.1
            },
            elapsed: 0.0,
        }
    }

    pub fn tick(&mut self, dt: f32) {
        self.elapsed += dt;
        while self.elapsed >= self.frame_duration {
            self.elapsed -= self.frame_duration;
            self.frame = (self.frame + 1) % self.frame_count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weapon_gate() {
        let mut weapon = Weapon::new(5.0, 500.0, 10);

        assert!(weapon.can_fire());
        weapon.reset_cooldown();
        assert!(!weapon.can_fire());

        weapon.tick(0.1);
        assert!(!weapon.can_fire());
        weapon.tick(0.11);
        assert!(weapon.can_fire());
    }

    #[test]
    fn test_weapon_with_interval() {
        let weapon = Weapon::with_interval(2.0, 300.0, 15);
        assert!((weapon.fire_rate - 0.5).abs() < 1e-6);

        // Nonsense interval falls back to the default cadence.
        let fallback = Weapon::with_interval(0.0, 300.0, 15);
        assert!((fallback.fire_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_health_dead() {
        let mut health = Health::new(10);
        assert!(!health.is_dead());

        health.current = 0;
        assert!(health.is_dead());
        health.current = -5;
        assert!(health.is_dead());
    }

    #[test]
    fn test_animation_wraps() {
        let mut anim = Animation::new(3, 0.1);

        anim.tick(0.25);
        assert_eq!(anim.frame, 2);
        anim.tick(0.1);
        assert_eq!(anim.frame, 0);
    }
}
