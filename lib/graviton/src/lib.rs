#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Engine crate: the sparse-array entity/component registry and the UDP
//! networking stack (transport, per-client reliability, client registry).

pub mod ecs;
pub mod net;

pub mod prelude;
