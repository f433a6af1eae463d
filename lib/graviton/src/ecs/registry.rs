use crate::ecs::entity::{Entity, EntityAllocator};
use crate::ecs::storage::{Component, ComponentStore};
use crate::ecs::view::{View, ViewSet};
use anymap::any::Any as AnyMapAny;
use hashbrown::HashMap;
use std::any::TypeId;

type StoreMap = anymap::Map<dyn AnyMapAny + Send + Sync>;

/// Type-erased clear-at-index hook, wired up when a component type is first
/// registered. `kill` walks these so it never has to name concrete types.
type Remover = Box<dyn Fn(&mut StoreMap, usize) + Send + Sync>;

/// Entity/component registry: allocation and reuse of entity indices plus
/// one sparse store per registered component type.
///
/// Operations addressing a dead entity are absent-slot no-ops rather than
/// faults; stale handles are expected within a tick.
pub struct Registry {
    stores: StoreMap,
    removers: HashMap<TypeId, Remover>,
    allocator: EntityAllocator,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            stores: StoreMap::new(),
            removers: HashMap::new(),
            allocator: EntityAllocator::new(),
        }
    }

    /// Ensures the store for `T` exists and wires its remover. Idempotent.
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if self.removers.contains_key(&type_id) {
            return;
        }

        self.stores.insert(ComponentStore::<T>::new());
        self.removers.insert(
            type_id,
            Box::new(|stores, index| {
                if let Some(store) = stores.get_mut::<ComponentStore<T>>() {
                    store.remove(index);
                }
            }),
        );
    }

    /// Returns a free index, reusing killed indices LIFO.
    #[inline]
    pub fn spawn(&mut self) -> Entity {
        self.allocator.spawn()
    }

    /// Clears every component slot for the entity and recycles the index.
    /// Killing a dead entity is a no-op.
    pub fn kill(&mut self, entity: Entity) {
        if !self.allocator.kill(entity) {
            return;
        }

        let stores = &mut self.stores;
        for remover in self.removers.values() {
            remover(stores, entity.index());
        }
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.allocator.live_count()
    }

    #[inline]
    pub fn entity_from_index(&self, index: usize) -> Entity {
        Entity::from_index(index)
    }

    /// Attaches a component to a live entity, registering the type on first
    /// use. No-op on a dead entity.
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) {
        if !self.allocator.is_alive(entity) {
            return;
        }

        self.register_component::<T>();
        self.stores
            .get_mut::<ComponentStore<T>>()
            .expect("store registered above")
            .insert(entity.index(), value);
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.stores
            .get_mut::<ComponentStore<T>>()?
            .remove(entity.index())
    }

    #[inline]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.stores.get::<ComponentStore<T>>()?.get(entity.index())
    }

    #[inline]
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.stores
            .get_mut::<ComponentStore<T>>()?
            .get_mut(entity.index())
    }

    #[inline]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.get_component::<T>(entity).is_some()
    }

    /// Lazy iterator over `(Entity, (&A, ...))` for entities carrying every
    /// component in the tuple, in ascending index order.
    #[inline]
    pub fn view<'r, V: ViewSet<'r>>(&'r self) -> View<'r, V> {
        View::new(self)
    }

    #[inline]
    pub(crate) fn store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.stores.get::<ComponentStore<T>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel {
        vx: f32,
        vy: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Hp(i32);

    #[test]
    fn test_add_get_remove() {
        let mut reg = Registry::new();
        let e = reg.spawn();

        reg.add_component(e, Pos { x: 1.0, y: 2.0 });

        assert!(reg.has_component::<Pos>(e));
        assert_eq!(reg.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));

        reg.get_component_mut::<Pos>(e).unwrap().x = 9.0;
        assert_eq!(reg.get_component::<Pos>(e).unwrap().x, 9.0);

        assert_eq!(reg.remove_component::<Pos>(e), Some(Pos { x: 9.0, y: 2.0 }));
        assert!(!reg.has_component::<Pos>(e));
    }

    #[test]
    fn test_register_idempotent() {
        let mut reg = Registry::new();

        reg.register_component::<Pos>();
        let e = reg.spawn();
        reg.add_component(e, Pos { x: 3.0, y: 4.0 });

        // Re-registering must not wipe existing data.
        reg.register_component::<Pos>();
        assert_eq!(reg.get_component::<Pos>(e), Some(&Pos { x: 3.0, y: 4.0 }));
    }

    #[test]
    fn test_kill_clears_every_store() {
        let mut reg = Registry::new();
        let e = reg.spawn();

        reg.add_component(e, Pos { x: 0.0, y: 0.0 });
        reg.add_component(e, Vel { vx: 1.0, vy: 0.0 });
        reg.add_component(e, Hp(50));

        reg.kill(e);

        assert!(!reg.is_alive(e));
        assert!(reg.get_component::<Pos>(e).is_none());
        assert!(reg.get_component::<Vel>(e).is_none());
        assert!(reg.get_component::<Hp>(e).is_none());
    }

    #[test]
    fn test_reused_index_has_no_stale_slots() {
        let mut reg = Registry::new();

        let e1 = reg.spawn();
        reg.add_component(e1, Pos { x: 5.0, y: 5.0 });
        reg.add_component(e1, Hp(10));
        reg.kill(e1);

        let e2 = reg.spawn();
        assert_eq!(e2.index(), e1.index());

        // Nothing from the previous tenant survives.
        assert!(reg.get_component::<Pos>(e2).is_none());
        assert!(reg.get_component::<Hp>(e2).is_none());
    }

    #[test]
    fn test_kill_twice_is_kill_once() {
        let mut reg = Registry::new();

        let a = reg.spawn();
        reg.add_component(a, Hp(1));
        reg.kill(a);
        reg.kill(a);

        assert_eq!(reg.live_count(), 0);

        // The double kill must not have queued the index twice.
        let b = reg.spawn();
        let c = reg.spawn();
        assert_eq!(b.index(), a.index());
        assert_ne!(b, c);
    }

    #[test]
    fn test_dead_entity_ops_are_noops() {
        let mut reg = Registry::new();
        let e = reg.spawn();
        reg.kill(e);

        reg.add_component(e, Hp(7));
        assert!(reg.get_component::<Hp>(e).is_none());
        assert!(reg.remove_component::<Hp>(e).is_none());
        assert!(!reg.has_component::<Hp>(e));
    }

    #[test]
    fn test_view_single() {
        let mut reg = Registry::new();

        for i in 0..4 {
            let e = reg.spawn();
            if i % 2 == 0 {
                reg.add_component(e, Hp(i));
            }
        }

        let hits: Vec<_> = reg.view::<(Hp,)>().map(|(e, (hp,))| (e.index(), hp.0)).collect();
        assert_eq!(hits, vec![(0, 0), (2, 2)]);
    }

    #[test]
    fn test_view_pair_intersection_ascending() {
        let mut reg = Registry::new();

        let a = reg.spawn();
        reg.add_component(a, Pos { x: 1.0, y: 0.0 });
        reg.add_component(a, Vel { vx: 10.0, vy: 0.0 });

        let b = reg.spawn();
        reg.add_component(b, Pos { x: 2.0, y: 0.0 });

        let c = reg.spawn();
        reg.add_component(c, Pos { x: 3.0, y: 0.0 });
        reg.add_component(c, Vel { vx: 30.0, vy: 0.0 });

        let hits: Vec<_> = reg
            .view::<(Pos, Vel)>()
            .map(|(e, (pos, vel))| (e, pos.x, vel.vx))
            .collect();

        assert_eq!(hits, vec![(a, 1.0, 10.0), (c, 3.0, 30.0)]);
    }

    #[test]
    fn test_view_unregistered_type_is_empty() {
        let reg = Registry::new();

        assert_eq!(reg.view::<(Pos, Vel)>().count(), 0);
    }

    #[test]
    fn test_view_skips_killed() {
        let mut reg = Registry::new();

        let a = reg.spawn();
        reg.add_component(a, Hp(1));
        let b = reg.spawn();
        reg.add_component(b, Hp(2));

        reg.kill(a);

        let hits: Vec<_> = reg.view::<(Hp,)>().map(|(e, _)| e).collect();
        assert_eq!(hits, vec![b]);
    }
}
