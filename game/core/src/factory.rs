//! Entity assembly. Every simulation entity is built here so archetypes
//! stay consistent across the spawn sites.

use crate::components::*;
use crate::config::WorldRect;
use crate::level::{AttackKind, EnemyConfig, MovementKind};
use graviton::ecs::{Entity, Registry};
use photon::ClientId;

pub const PLAYER_SPAWN_X: f32 = 100.0;
pub const PLAYER_SPAWN_Y: f32 = 300.0;
pub const PLAYER_SPAWN_STEP: f32 = 100.0;
pub const PLAYER_SPEED: f32 = 300.0;
pub const PLAYER_HEALTH: i32 = 100;
pub const PLAYER_FIRE_RATE: f32 = 5.0;
pub const PLAYER_PROJECTILE_SPEED: f32 = 500.0;
pub const PLAYER_PROJECTILE_DAMAGE: i32 = 10;

/// Muzzle offset in front of the ship.
const MUZZLE_X: f32 = 50.0;
const MUZZLE_Y: f32 = 10.0;
/// Vertical speed given to the side shots of a triple volley.
const TRIPLE_SHOT_VY: f32 = 100.0;

const EXPLOSION_LIFETIME: f32 = 0.5;

pub fn spawn_player(
    reg: &mut Registry,
    client_id: ClientId,
    seat: u8,
    world: &WorldRect,
) -> Entity {
    let player = reg.spawn();
    let y = PLAYER_SPAWN_Y + f32::from(seat) * PLAYER_SPAWN_STEP;

    reg.add_component(player, Position { x: PLAYER_SPAWN_X, y });
    reg.add_component(player, Velocity::default());
    reg.add_component(player, Health::new(PLAYER_HEALTH));
    reg.add_component(
        player,
        Weapon::new(
            PLAYER_FIRE_RATE,
            PLAYER_PROJECTILE_SPEED,
            PLAYER_PROJECTILE_DAMAGE,
        ),
    );
    reg.add_component(player, Controllable { speed: PLAYER_SPEED });
    reg.add_component(
        player,
        BoundedMovement {
            min_x: 0.0,
            max_x: world.width,
            min_y: 0.0,
            max_y: world.height,
        },
    );
    reg.add_component(player, CollisionBox::new(32.0, 32.0));
    reg.add_component(player, Tag::Player);
    reg.add_component(player, PlayerSeat { index: seat });
    reg.add_component(player, NetworkBinding { client_id });
    reg.add_component(player, Animation::new(4, 0.1));

    player
}

fn spawn_projectile(
    reg: &mut Registry,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    damage: i32,
    owner: Owner,
    size: f32,
) -> Entity {
    let projectile = reg.spawn();

    reg.add_component(projectile, Position { x, y });
    reg.add_component(projectile, Velocity { vx, vy });
    reg.add_component(projectile, Health::new(1));
    reg.add_component(projectile, CollisionBox::new(size, size));
    reg.add_component(
        projectile,
        DamageOnContact {
            amount: damage,
            destroy_on_hit: true,
        },
    );
    reg.add_component(projectile, Tag::Projectile);
    reg.add_component(projectile, owner);

    projectile
}

/// Fires the player's weapon: one or more projectiles depending on the
/// active upgrade, with a running power cannon boosting damage. The caller
/// has already checked the fire gate.
pub fn spawn_player_volley(reg: &mut Registry, shooter: Entity) {
    let (x, y) = match reg.get_component::<Position>(shooter) {
        Some(pos) => (pos.x, pos.y),
        None => return,
    };
    let weapon = match reg.get_component::<Weapon>(shooter) {
        Some(weapon) => *weapon,
        None => return,
    };

    let cannon_active = reg
        .get_component::<PowerUp>(shooter)
        .map(|p| p.active && p.kind == PowerUpKind::PowerCannon)
        .unwrap_or(false);

    let damage = if cannon_active {
        weapon.damage * PowerUp::CANNON_DAMAGE_FACTOR
    } else {
        weapon.damage
    };

    let mx = x + MUZZLE_X;
    let my = y + MUZZLE_Y;

    match weapon.upgrade {
        WeaponUpgrade::TripleShot => {
            spawn_projectile(reg, mx, my, weapon.projectile_speed, 0.0, damage, Owner::PlayerSide, 8.0);
            spawn_projectile(
                reg,
                mx,
                my,
                weapon.projectile_speed,
                -TRIPLE_SHOT_VY,
                damage,
                Owner::PlayerSide,
                8.0,
            );
            spawn_projectile(
                reg,
                mx,
                my,
                weapon.projectile_speed,
                TRIPLE_SHOT_VY,
                damage,
                Owner::PlayerSide,
                8.0,
            );
        }
        WeaponUpgrade::Missile => {
            // Slower and fatter, hits much harder.
            spawn_projectile(
                reg,
                mx,
                my,
                weapon.projectile_speed * 0.75,
                0.0,
                damage * 3,
                Owner::PlayerSide,
                16.0,
            );
        }
        WeaponUpgrade::PowerShot => {
            spawn_projectile(
                reg,
                mx,
                my,
                weapon.projectile_speed * 1.25,
                0.0,
                damage * 2,
                Owner::PlayerSide,
                12.0,
            );
        }
        WeaponUpgrade::Single => {
            spawn_projectile(reg, mx, my, weapon.projectile_speed, 0.0, damage, Owner::PlayerSide, 8.0);
        }
    }
}

pub fn spawn_enemy_projectile(
    reg: &mut Registry,
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    damage: i32,
) -> Entity {
    spawn_projectile(reg, x, y, vx, vy, damage, Owner::EnemySide, 8.0)
}

fn movement_pattern(def: &EnemyConfig) -> MovementPattern {
    let movement = &def.behavior.movement;
    match movement.kind {
        MovementKind::Sine => MovementPattern::Sine {
            amplitude: if movement.amplitude > 0.0 {
                movement.amplitude
            } else {
                100.0
            },
            frequency: if movement.frequency > 0.0 {
                movement.frequency
            } else {
                3.0
            },
            phase: movement.phase,
        },
        MovementKind::Zigzag => MovementPattern::ZigZag {
            amplitude: if movement.amplitude > 0.0 {
                movement.amplitude
            } else {
                150.0
            },
            period: if movement.period > 0.0 {
                movement.period
            } else {
                2.0
            },
        },
        _ => MovementPattern::Linear,
    }
}

fn attack_style(def: &EnemyConfig) -> Option<AttackStyle> {
    match def.attack.kind {
        AttackKind::None | AttackKind::Unknown => None,
        AttackKind::Straight | AttackKind::Front => Some(AttackStyle::Straight),
        AttackKind::Targeted => Some(AttackStyle::Targeted),
        AttackKind::Spread => Some(AttackStyle::Spread {
            count: def.attack.projectile_count.max(1),
            angle_deg: def.attack.spread_angle,
        }),
    }
}

fn populate_enemy(reg: &mut Registry, entity: Entity, def: &EnemyConfig, x: f32, y: f32, vx: f32) {
    reg.add_component(entity, Position { x, y });
    reg.add_component(entity, Velocity { vx, vy: 0.0 });
    reg.add_component(entity, Health::new(def.health));
    reg.add_component(entity, movement_pattern(def));
    reg.add_component(
        entity,
        DamageOnContact {
            amount: def.damage,
            destroy_on_hit: false,
        },
    );
    reg.add_component(entity, ScoreValue(def.score_value));
    reg.add_component(
        entity,
        Animation::new(def.sprite.frame_count, def.sprite.frame_duration),
    );

    if let Some(style) = attack_style(def) {
        reg.add_component(
            entity,
            Weapon::with_interval(
                def.attack.cooldown,
                def.attack.projectile.speed,
                def.attack.projectile.damage,
            ),
        );
        reg.add_component(entity, style);
    }
}

pub fn spawn_enemy(reg: &mut Registry, def: &EnemyConfig, x: f32, y: f32) -> Entity {
    let enemy = reg.spawn();

    populate_enemy(reg, enemy, def, x, y, -def.speed);

    let box_w = def.sprite.frame_width as f32 * def.sprite.scale_x * 0.9;
    let box_h = def.sprite.frame_height as f32 * def.sprite.scale_y * 0.9;
    reg.add_component(enemy, CollisionBox::new(box_w, box_h));
    reg.add_component(enemy, Tag::Enemy);

    enemy
}

/// Bosses hold position once on screen and use a slightly forgiving
/// hitbox.
pub fn spawn_boss(reg: &mut Registry, def: &EnemyConfig, x: f32, y: f32) -> Entity {
    let boss = reg.spawn();

    populate_enemy(reg, boss, def, x, y, 0.0);

    let box_w = def.sprite.frame_width as f32 * def.sprite.scale_x * 0.8;
    let box_h = def.sprite.frame_height as f32 * def.sprite.scale_y * 0.8;
    reg.add_component(boss, CollisionBox::new(box_w, box_h));
    reg.add_component(boss, Tag::Boss);

    boss
}

pub fn spawn_explosion(reg: &mut Registry, x: f32, y: f32) -> Entity {
    let explosion = reg.spawn();

    reg.add_component(explosion, Position { x, y });
    reg.add_component(explosion, Velocity::default());
    reg.add_component(
        explosion,
        Lifetime {
            remaining: EXPLOSION_LIFETIME,
        },
    );
    reg.add_component(explosion, Tag::Explosion);
    reg.add_component(explosion, Animation::new(6, 0.08));

    explosion
}
