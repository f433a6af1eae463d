use crate::components::{AttackStyle, Position, Tag, Weapon};
use crate::factory;
use graviton::ecs::{Entity, Registry};

/// Targeted shots lead a bit faster than the configured projectile speed.
const TARGETED_SPEED_FACTOR: f32 = 1.5;
/// Spread volleys fan around straight-left.
const SPREAD_BASE_ANGLE_DEG: f32 = 180.0;

/// Counts down every weapon's fire gate.
pub fn weapon_cooldown_system(reg: &mut Registry, dt: f32) {
    let armed: Vec<Entity> = reg.view::<(Weapon,)>().map(|(entity, _)| entity).collect();

    for entity in armed {
        if let Some(weapon) = reg.get_component_mut::<Weapon>(entity) {
            weapon.tick(dt);
        }
    }
}

struct DueVolley {
    entity: Entity,
    x: f32,
    y: f32,
    speed: f32,
    damage: i32,
    style: AttackStyle,
}

/// Fires every enemy weapon whose gate is open, by attack style:
/// straight shoots along -x, targeted aims at the nearest live player,
/// spread fans a volley around -x.
pub fn enemy_fire_system(reg: &mut Registry) {
    let players: Vec<(f32, f32)> = reg
        .view::<(Position, Tag)>()
        .filter(|(_, (_, tag))| **tag == Tag::Player)
        .map(|(_, (pos, _))| (pos.x, pos.y))
        .collect();

    let due: Vec<DueVolley> = reg
        .view::<(Position, Weapon, AttackStyle)>()
        .filter(|(_, (_, weapon, _))| weapon.can_fire())
        .map(|(entity, (pos, weapon, style))| DueVolley {
            entity,
            x: pos.x,
            y: pos.y,
            speed: weapon.projectile_speed,
            damage: weapon.damage,
            style: *style,
        })
        .collect();

    for volley in due {
        match volley.style {
            AttackStyle::Straight => {
                factory::spawn_enemy_projectile(
                    reg,
                    volley.x,
                    volley.y,
                    -volley.speed,
                    0.0,
                    volley.damage,
                );
            }
            AttackStyle::Targeted => {
                if let Some((tx, ty)) = nearest_player(&players, volley.x, volley.y) {
                    let dx = tx - volley.x;
                    let dy = ty - volley.y;
                    let magnitude = (dx * dx + dy * dy).sqrt();

                    if magnitude > 0.0 {
                        let speed = volley.speed * TARGETED_SPEED_FACTOR;
                        factory::spawn_enemy_projectile(
                            reg,
                            volley.x,
                            volley.y,
                            dx / magnitude * speed,
                            dy / magnitude * speed,
                            volley.damage,
                        );
                    }
                }
            }
            AttackStyle::Spread { count, angle_deg } => {
                let count = count.max(1);
                for p in 0..count {
                    let offset = if count > 1 {
                        (p as f32 / (count - 1) as f32 - 0.5) * angle_deg
                    } else {
                        0.0
                    };
                    let radians = (SPREAD_BASE_ANGLE_DEG + offset).to_radians();
                    factory::spawn_enemy_projectile(
                        reg,
                        volley.x,
                        volley.y,
                        radians.cos() * volley.speed,
                        radians.sin() * volley.speed,
                        volley.damage,
                    );
                }
            }
        }

        // The gate closes whether or not a target was found.
        if let Some(weapon) = reg.get_component_mut::<Weapon>(volley.entity) {
            weapon.reset_cooldown();
        }
    }
}

fn nearest_player(players: &[(f32, f32)], x: f32, y: f32) -> Option<(f32, f32)> {
    players
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (a.0 - x).powi(2) + (a.1 - y).powi(2);
            let db = (b.0 - x).powi(2) + (b.1 - y).powi(2);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}
