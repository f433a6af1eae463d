pub use crate::ecs::{Component, ComponentStore, Entity, Registry};
pub use crate::net::{
    spawn_retry_worker, ClientFlow, ClientRegistry, NetHandle, NetworkPacket, PendingPacket,
    Reliability, ReliabilityConfig, SafeQueue, UdpTransport,
};
