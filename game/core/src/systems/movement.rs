use crate::components::{
    Animation, BoundedMovement, MovementPattern, Position, Velocity,
};
use graviton::ecs::{Entity, Registry};
use photon::logging::{self, Logger};

/// Integrates velocity into position. Sine patterns add a perpendicular
/// oscillation, zig-zag alternates direction every half period, and
/// bounded entities are clamped to their rectangle afterwards. An entity
/// whose position goes non-finite is removed; the tick carries on.
pub fn movement_system(reg: &mut Registry, dt: f32, elapsed: f32, log: &Logger) {
    let shared: &Registry = reg;
    let moving: Vec<(Entity, Velocity, Option<MovementPattern>)> = shared
        .view::<(Position, Velocity)>()
        .map(|(entity, (_, vel))| {
            (
                entity,
                *vel,
                shared.get_component::<MovementPattern>(entity).copied(),
            )
        })
        .collect();

    let mut corrupt = Vec::new();

    for (entity, vel, pattern) in moving {
        if let Some(pos) = reg.get_component_mut::<Position>(entity) {
            match pattern {
                Some(MovementPattern::Sine {
                    amplitude,
                    frequency,
                    phase,
                }) => {
                    pos.x += vel.vx * dt;
                    pos.y += (frequency * elapsed + phase).sin() * amplitude * dt;
                }
                Some(MovementPattern::ZigZag { amplitude, period }) => {
                    pos.x += vel.vx * dt;
                    // Entities in the same group weave out of phase.
                    let offset = entity.index() as f32 * 0.5;
                    let cycle = (elapsed + offset) % period;
                    let direction = if cycle < period * 0.5 { 1.0 } else { -1.0 };
                    pos.y += direction * amplitude * dt;
                }
                _ => {
                    pos.x += vel.vx * dt;
                    pos.y += vel.vy * dt;
                }
            }

            if !pos.x.is_finite() || !pos.y.is_finite() {
                corrupt.push(entity);
            }
        }
    }

    let bounded: Vec<(Entity, BoundedMovement)> = reg
        .view::<(BoundedMovement,)>()
        .map(|(entity, (bounds,))| (entity, *bounds))
        .collect();

    for (entity, bounds) in bounded {
        if let Some(pos) = reg.get_component_mut::<Position>(entity) {
            pos.x = pos.x.max(bounds.min_x).min(bounds.max_x);
            pos.y = pos.y.max(bounds.min_y).min(bounds.max_y);
        }
    }

    for entity in corrupt {
        logging::warn!(log, "removing entity with non-finite position";
                       "entity" => entity.id());
        reg.kill(entity);
    }
}

/// Advances every animation's frame counter.
pub fn animation_system(reg: &mut Registry, dt: f32) {
    let animated: Vec<Entity> = reg.view::<(Animation,)>().map(|(entity, _)| entity).collect();

    for entity in animated {
        if let Some(anim) = reg.get_component_mut::<Animation>(entity) {
            anim.tick(dt);
        }
    }
}
