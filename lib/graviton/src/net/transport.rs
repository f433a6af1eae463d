use crate::net::clients::ClientRegistry;
use crate::net::queue::SafeQueue;
use mio::net::UdpSocket;
use mio::{Events, Poll, PollOpt, Ready, Token};
use photon::logging::{self, Logger};
use photon::{ClientId, PROTOCOL_MAGIC};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const SOCKET_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(10);
const RECV_BUF_SIZE: usize = 65536;
const INBOUND_QUEUE_CAP: usize = 4096;

/// Smallest frame the transport will consider: magic + opcode.
const MIN_FRAME_SIZE: usize = 3;

/// A raw datagram as it arrived off the socket.
#[derive(Debug, Clone)]
pub struct NetworkPacket {
    pub data: Vec<u8>,
    pub sender: SocketAddr,
}

#[derive(Debug)]
struct OutboundPacket {
    data: Vec<u8>,
    dest: SocketAddr,
}

/// Cheap handle for producing outbound traffic and resolving client ids.
/// The simulation holds one of these instead of a transport reference, so
/// the two sides only meet through the queues.
#[derive(Clone)]
pub struct NetHandle {
    outbound: Arc<SafeQueue<OutboundPacket>>,
    clients: Arc<Mutex<ClientRegistry>>,
}

impl NetHandle {
    fn lock_clients(&self) -> MutexGuard<ClientRegistry> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queues bytes for one client. Returns false for an unknown id.
    pub fn send_to(&self, client_id: ClientId, data: Vec<u8>) -> bool {
        let dest = self.lock_clients().lookup_addr(client_id);
        match dest {
            Some(dest) => {
                self.outbound.push(OutboundPacket { data, dest });
                true
            }
            None => false,
        }
    }

    pub fn send_to_endpoint(&self, dest: SocketAddr, data: Vec<u8>) {
        self.outbound.push(OutboundPacket { data, dest });
    }

    pub fn send_to_many(&self, client_ids: &[ClientId], data: &[u8]) {
        for &client_id in client_ids {
            self.send_to(client_id, data.to_vec());
        }
    }

    pub fn broadcast(&self, data: &[u8]) {
        let dests = self.lock_clients().addrs();
        for dest in dests {
            self.outbound.push(OutboundPacket {
                data: data.to_vec(),
                dest,
            });
        }
    }

    pub fn client_id_of(&self, addr: &SocketAddr) -> Option<ClientId> {
        self.lock_clients().lookup_id(addr)
    }

    /// Registers (or refreshes) an endpoint and returns its client id.
    pub fn register(&self, addr: SocketAddr, now: Instant) -> ClientId {
        self.lock_clients().register(addr, now).0
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.lock_clients().ids()
    }

    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Evicts clients idle beyond `timeout`; the caller disposes of their
    /// per-client state.
    pub fn evict_inactive(&self, timeout: Duration, now: Instant) -> Vec<ClientId> {
        self.lock_clients().remove_inactive(timeout, now)
    }

    pub fn remove_client(&self, client_id: ClientId) {
        self.lock_clients().remove(client_id);
    }
}

/// The single bound UDP endpoint and its poll loop. Receives datagrams into
/// the bounded inbound queue (after a magic pre-check) and drains the
/// outbound queue onto the socket. Holds no game state.
pub struct UdpTransport {
    socket: UdpSocket,
    poll: Poll,
    events: Events,
    local_addr: SocketAddr,

    inbound: Arc<SafeQueue<NetworkPacket>>,
    outbound: Arc<SafeQueue<OutboundPacket>>,
    clients: Arc<Mutex<ClientRegistry>>,

    recv_buf: Vec<u8>,
    log: Logger,
}

impl UdpTransport {
    /// Binds the endpoint. An empty bind address means `::` (dual-stack
    /// where the OS allows it); if the v6 bind fails the transport falls
    /// back to IPv4.
    pub fn bind(bind_address: Option<&str>, port: u16, log: &Logger) -> io::Result<UdpTransport> {
        let log = log.new(logging::o!("layer" => "transport"));

        let socket = match bind_address {
            Some(address) if !address.is_empty() => {
                let addr: SocketAddr = format!("{}:{}", address, port)
                    .parse()
                    .or_else(|_| format!("[{}]:{}", address, port).parse())
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
                UdpSocket::bind(&addr)?
            }
            _ => {
                let v6: SocketAddr = format!("[::]:{}", port)
                    .parse()
                    .expect("wildcard v6 address");
                match UdpSocket::bind(&v6) {
                    Ok(socket) => socket,
                    Err(err) => {
                        logging::warn!(log, "dual-stack bind failed, falling back to ipv4";
                                       "error" => %err);
                        let v4: SocketAddr = format!("0.0.0.0:{}", port)
                            .parse()
                            .expect("wildcard v4 address");
                        UdpSocket::bind(&v4)?
                    }
                }
            }
        };

        let local_addr = socket.local_addr()?;

        let poll = Poll::new()?;
        poll.register(&socket, SOCKET_TOKEN, Ready::readable(), PollOpt::edge())?;

        logging::info!(log, "udp endpoint bound"; "addr" => %local_addr);

        Ok(UdpTransport {
            socket,
            poll,
            events: Events::with_capacity(1024),
            local_addr,
            inbound: Arc::new(SafeQueue::bounded(INBOUND_QUEUE_CAP)),
            outbound: Arc::new(SafeQueue::unbounded()),
            clients: Arc::new(Mutex::new(ClientRegistry::new())),
            recv_buf: vec![0u8; RECV_BUF_SIZE],
            log,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> NetHandle {
        NetHandle {
            outbound: Arc::clone(&self.outbound),
            clients: Arc::clone(&self.clients),
        }
    }

    pub fn inbound(&self) -> Arc<SafeQueue<NetworkPacket>> {
        Arc::clone(&self.inbound)
    }

    /// The network task body: poll with a short timeout so the stop flag is
    /// observed, drain the socket, flush the outbound queue.
    pub fn run(&mut self, running: &AtomicBool) {
        logging::info!(self.log, "network task started");

        while running.load(Ordering::Relaxed) {
            if let Err(err) = self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                logging::error!(self.log, "poll failed"; "error" => %err);
                break;
            }

            self.drain_socket();
            self.flush_outbound();
        }

        // Final flush so shutdown notices have a chance to leave.
        self.flush_outbound();

        logging::info!(self.log, "network task stopped");
    }

    fn drain_socket(&mut self) {
        loop {
            match self.socket.recv_from(&mut self.recv_buf) {
                Ok((len, sender)) => self.accept_datagram(len, sender),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::warn!(self.log, "receive error"; "error" => %err);
                    break;
                }
            }
        }
    }

    fn accept_datagram(&mut self, len: usize, sender: SocketAddr) {
        if len < MIN_FRAME_SIZE {
            return;
        }

        // Magic is checked before the packet costs anything further.
        let magic = u16::from_le_bytes([self.recv_buf[0], self.recv_buf[1]]);
        if magic != PROTOCOL_MAGIC {
            logging::debug!(self.log, "dropping frame with bad magic";
                            "sender" => %sender,
                            "magic" => magic);
            return;
        }

        let now = Instant::now();
        let (client_id, is_new) = {
            let mut clients = match self.clients.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            clients.register(sender, now)
        };

        if is_new {
            logging::info!(self.log, "new client registered";
                           "client_id" => client_id,
                           "addr" => %sender);
        }

        let packet = NetworkPacket {
            data: self.recv_buf[..len].to_vec(),
            sender,
        };

        if !self.inbound.push(packet) {
            logging::warn!(self.log, "inbound queue overflow, dropped oldest packet");
        }
    }

    fn flush_outbound(&mut self) {
        while let Some(packet) = self.outbound.try_pop() {
            match self.socket.send_to(&packet.data, &packet.dest) {
                Ok(_) => {}
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    // Socket buffer is full; try again next iteration.
                    self.outbound.push_front(packet);
                    break;
                }
                Err(err) => {
                    // Transient send failures are dropped here; reliable
                    // frames get another chance from the retry worker.
                    logging::warn!(self.log, "send error, dropping frame";
                                   "dest" => %packet.dest,
                                   "error" => %err);
                }
            }
        }
    }
}
