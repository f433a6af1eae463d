use crate::ecs::entity::Entity;
use crate::ecs::registry::Registry;
use crate::ecs::storage::{Component, ComponentStore};

/// Tuple of component types that can be iterated together. Implemented for
/// tuples up to four elements; the first element's store drives iteration,
/// which is sound because an entity carrying the full set is necessarily
/// present in it.
pub trait ViewSet<'r>: Sized {
    type Item;
    type Fetch;

    fn fetch(registry: &'r Registry) -> Option<Self::Fetch>;
    fn span(fetch: &Self::Fetch) -> usize;
    fn get(fetch: &Self::Fetch, index: usize) -> Option<Self::Item>;
}

/// Lazy iterator over entities holding every component of the set, in
/// ascending index order.
pub struct View<'r, V: ViewSet<'r>> {
    fetch: Option<V::Fetch>,
    index: usize,
    span: usize,
}

impl<'r, V: ViewSet<'r>> View<'r, V> {
    pub(crate) fn new(registry: &'r Registry) -> View<'r, V> {
        let fetch = V::fetch(registry);
        let span = fetch.as_ref().map(V::span).unwrap_or(0);

        View {
            fetch,
            index: 0,
            span,
        }
    }
}

impl<'r, V: ViewSet<'r>> Iterator for View<'r, V> {
    type Item = (Entity, V::Item);

    fn next(&mut self) -> Option<Self::Item> {
        let fetch = self.fetch.as_ref()?;

        while self.index < self.span {
            let index = self.index;
            self.index += 1;

            if let Some(item) = V::get(fetch, index) {
                return Some((Entity::from_index(index), item));
            }
        }

        None
    }
}

macro_rules! viewset_tuple {
    ($( $field_type:ident:$field_seq:tt ),*) => {
        impl<'r, $($field_type: Component),*> ViewSet<'r> for ($($field_type,)*) {
            type Item = ($(&'r $field_type,)*);
            type Fetch = ($(&'r ComponentStore<$field_type>,)*);

            fn fetch(registry: &'r Registry) -> Option<Self::Fetch> {
                Some(($(registry.store::<$field_type>()?,)*))
            }

            fn span(fetch: &Self::Fetch) -> usize {
                fetch.0.span()
            }

            fn get(fetch: &Self::Fetch, index: usize) -> Option<Self::Item> {
                Some(($(fetch.$field_seq.get(index)?,)*))
            }
        }
    };
}

viewset_tuple!(A:0);
viewset_tuple!(A:0, B:1);
viewset_tuple!(A:0, B:1, C:2);
viewset_tuple!(A:0, B:1, C:2, D:3);
