use crate::components::{
    DamageFlash, Health, Lifetime, Position, ScoreValue, Tag,
};
use crate::config::WorldRect;
use crate::factory;
use graviton::ecs::{Entity, Registry};
use photon::logging::{self, Logger};

/// What one cleanup pass reaped, for scoring and wave accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CleanupReport {
    pub enemies_killed: u32,
    pub bosses_killed: u32,
    pub players_killed: u32,
    pub score: u32,
}

/// End-of-tick reaping: expired lifetimes, decayed damage flashes, dead
/// entities (with explosions for enemies and bosses), and projectiles or
/// enemies that drifted past the world margin.
pub fn cleanup_system(
    reg: &mut Registry,
    dt: f32,
    world: &WorldRect,
    log: &Logger,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let mut to_kill: Vec<Entity> = Vec::new();

    // Lifetime countdowns (explosions).
    let timed: Vec<Entity> = reg.view::<(Lifetime,)>().map(|(entity, _)| entity).collect();
    for entity in timed {
        if let Some(lifetime) = reg.get_component_mut::<Lifetime>(entity) {
            lifetime.remaining -= dt;
            if lifetime.remaining <= 0.0 {
                to_kill.push(entity);
            }
        }
    }

    // Damage flashes decay and drop off.
    let flashing: Vec<Entity> = reg
        .view::<(DamageFlash,)>()
        .map(|(entity, _)| entity)
        .collect();
    for entity in flashing {
        let expired = match reg.get_component_mut::<DamageFlash>(entity) {
            Some(flash) => {
                flash.remaining -= dt;
                flash.remaining <= 0.0
            }
            None => false,
        };
        if expired {
            reg.remove_component::<DamageFlash>(entity);
        }
    }

    // Dead entities. Enemies and bosses leave an explosion and score.
    struct Casualty {
        entity: Entity,
        tag: Tag,
        x: f32,
        y: f32,
        score: u32,
    }

    let shared: &Registry = reg;
    let casualties: Vec<Casualty> = shared
        .view::<(Health, Tag, Position)>()
        .filter(|(_, (health, _, _))| health.is_dead())
        .map(|(entity, (_, tag, pos))| Casualty {
            entity,
            tag: *tag,
            x: pos.x,
            y: pos.y,
            score: shared
                .get_component::<ScoreValue>(entity)
                .map(|score| score.0)
                .unwrap_or(0),
        })
        .collect();

    for casualty in casualties {
        match casualty.tag {
            Tag::Enemy => {
                report.enemies_killed += 1;
                report.score += casualty.score;
                factory::spawn_explosion(reg, casualty.x, casualty.y);
            }
            Tag::Boss => {
                report.bosses_killed += 1;
                report.score += casualty.score;
                factory::spawn_explosion(reg, casualty.x, casualty.y);
            }
            Tag::Player => {
                report.players_killed += 1;
                logging::info!(log, "player ship destroyed";
                               "entity" => casualty.entity.id());
            }
            _ => {}
        }
        to_kill.push(casualty.entity);
    }

    // Out-of-world culling for the mobile kinds.
    let strays: Vec<Entity> = reg
        .view::<(Position, Tag)>()
        .filter(|(_, (pos, tag))| {
            matches!(tag, Tag::Projectile | Tag::Enemy) && world.out_of_bounds(pos.x, pos.y)
        })
        .map(|(entity, _)| entity)
        .collect();
    to_kill.extend(strays);

    for entity in to_kill {
        reg.kill(entity);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Velocity;
    use crate::config::WorldRect;
    use crate::level::EnemyConfig;
    use photon::logging;

    fn world() -> WorldRect {
        WorldRect::default()
    }

    fn log() -> Logger {
        logging::discard()
    }

    fn enemy_at(reg: &mut Registry, x: f32, y: f32) -> Entity {
        let mut def = EnemyConfig::default();
        def.id = "drone".into();
        def.score_value = 150;
        factory::spawn_enemy(reg, &def, x, y)
    }

    #[test]
    fn test_dead_enemy_reaped_with_explosion_and_score() {
        let mut reg = Registry::new();
        let enemy = enemy_at(&mut reg, 500.0, 300.0);
        reg.get_component_mut::<Health>(enemy).unwrap().current = 0;

        let report = cleanup_system(&mut reg, 0.016, &world(), &log());

        assert_eq!(report.enemies_killed, 1);
        assert_eq!(report.score, 150);
        assert!(!reg.is_alive(enemy));

        let explosions = reg
            .view::<(Tag,)>()
            .filter(|(_, (tag,))| **tag == Tag::Explosion)
            .count();
        assert_eq!(explosions, 1);
    }

    #[test]
    fn test_out_of_world_culled() {
        let mut reg = Registry::new();
        let stray = factory::spawn_enemy_projectile(&mut reg, 2200.1, 300.0, 300.0, 0.0, 10);
        let inside = factory::spawn_enemy_projectile(&mut reg, 1000.0, 300.0, 300.0, 0.0, 10);

        cleanup_system(&mut reg, 0.016, &world(), &log());

        assert!(!reg.is_alive(stray));
        assert!(reg.is_alive(inside));
    }

    #[test]
    fn test_explosion_expires() {
        let mut reg = Registry::new();
        let explosion = factory::spawn_explosion(&mut reg, 100.0, 100.0);

        cleanup_system(&mut reg, 0.3, &world(), &log());
        assert!(reg.is_alive(explosion));

        cleanup_system(&mut reg, 0.3, &world(), &log());
        assert!(!reg.is_alive(explosion));
    }

    #[test]
    fn test_flash_decays() {
        let mut reg = Registry::new();
        let enemy = enemy_at(&mut reg, 500.0, 300.0);
        reg.add_component(enemy, DamageFlash::armed());

        cleanup_system(&mut reg, 0.1, &world(), &log());
        assert!(reg.has_component::<DamageFlash>(enemy));

        cleanup_system(&mut reg, 0.1, &world(), &log());
        assert!(!reg.has_component::<DamageFlash>(enemy));
    }

    #[test]
    fn test_dead_player_counted_not_exploded() {
        let mut reg = Registry::new();
        let world_rect = world();
        let player = factory::spawn_player(&mut reg, 1, 0, &world_rect);
        reg.get_component_mut::<Health>(player).unwrap().current = -5;

        let report = cleanup_system(&mut reg, 0.016, &world_rect, &log());

        assert_eq!(report.players_killed, 1);
        assert!(!reg.is_alive(player));
        assert_eq!(
            reg.view::<(Tag,)>()
                .filter(|(_, (tag,))| **tag == Tag::Explosion)
                .count(),
            0
        );
    }

    #[test]
    fn test_projectile_spent_is_quietly_reaped() {
        let mut reg = Registry::new();
        let shot = factory::spawn_enemy_projectile(&mut reg, 500.0, 300.0, -300.0, 0.0, 10);
        reg.get_component_mut::<Health>(shot).unwrap().current = 0;
        reg.add_component(shot, Velocity { vx: -300.0, vy: 0.0 });

        let report = cleanup_system(&mut reg, 0.016, &world(), &log());

        assert!(!reg.is_alive(shot));
        assert_eq!(report.enemies_killed, 0);
        assert_eq!(report.score, 0);
    }
}
