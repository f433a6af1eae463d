//! UDP networking: the polled transport, the endpoint/client registry, the
//! per-client reliability flows, and the thread-safe queues gluing the
//! network task to the simulation task.

pub mod clients;
pub mod queue;
pub mod reliability;
pub mod transport;

pub use self::clients::{ClientEndpoint, ClientRegistry};
pub use self::queue::SafeQueue;
pub use self::reliability::{
    spawn_retry_worker, ClientFlow, PendingPacket, Reliability, ReliabilityConfig,
};
pub use self::transport::{NetHandle, NetworkPacket, UdpTransport};
