use crate::components::{
    CollisionBox, DamageFlash, DamageOnContact, Health, Owner, Position, PowerUp, PowerUpKind,
    Tag,
};
use graviton::ecs::{Entity, Registry};

struct ColliderInfo {
    entity: Entity,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    tag: Tag,
    owner: Option<Owner>,
    damage: Option<DamageOnContact>,
}

#[inline]
fn aabb_overlap(a: &ColliderInfo, b: &ColliderInfo) -> bool {
    a.x < b.x + b.width && a.x + a.width > b.x && a.y < b.y + b.height && a.y + a.height > b.y
}

/// Projectile collisions. Damage only ever applies across sides: a
/// player-owned projectile hits enemies and bosses, an enemy-owned one
/// hits players. A projectile flagged `destroy_on_hit` dies with the hit;
/// a running shield absorbs damage to its player. Hits arm the target's
/// damage flash.
pub fn collision_system(reg: &mut Registry) {
    let shared: &Registry = reg;
    let colliders: Vec<ColliderInfo> = shared
        .view::<(Position, CollisionBox, Tag)>()
        .map(|(entity, (pos, hit_box, tag))| ColliderInfo {
            entity,
            x: pos.x + hit_box.offset_x,
            y: pos.y + hit_box.offset_y,
            width: hit_box.width,
            height: hit_box.height,
            tag: *tag,
            owner: shared.get_component::<Owner>(entity).copied(),
            damage: shared.get_component::<DamageOnContact>(entity).copied(),
        })
        .collect();

    let mut hits: Vec<(Entity, i32)> = Vec::new();
    let mut spent: Vec<Entity> = Vec::new();

    for attacker in colliders.iter().filter(|c| c.tag == Tag::Projectile) {
        let damage = match attacker.damage {
            Some(damage) => damage,
            None => continue,
        };
        let side = match attacker.owner {
            Some(side) => side,
            None => continue,
        };

        for target in &colliders {
            if target.entity == attacker.entity {
                continue;
            }

            let opposing = match side {
                Owner::PlayerSide => matches!(target.tag, Tag::Enemy | Tag::Boss),
                Owner::EnemySide => target.tag == Tag::Player,
            };
            if !opposing {
                continue;
            }

            if aabb_overlap(attacker, target) {
                hits.push((target.entity, damage.amount));
                if damage.destroy_on_hit {
                    spent.push(attacker.entity);
                    break;
                }
            }
        }
    }

    for (target, amount) in hits {
        let shielded = reg
            .get_component::<PowerUp>(target)
            .map(|p| p.active && p.kind == PowerUpKind::Shield)
            .unwrap_or(false);

        if shielded {
            continue;
        }

        if let Some(health) = reg.get_component_mut::<Health>(target) {
            health.current -= amount;
        }
        reg.add_component(target, DamageFlash::armed());
    }

    for projectile in spent {
        if let Some(health) = reg.get_component_mut::<Health>(projectile) {
            health.current = 0;
        }
    }
}
