#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

/// Magic constant carried by every datagram, little-endian on the wire.
pub const PROTOCOL_MAGIC: u16 = 0xB542;

/// Monotone integer identity assigned to each remote endpoint by the server.
pub type ClientId = u32;

pub mod logging;
pub mod time;
pub mod wire;
