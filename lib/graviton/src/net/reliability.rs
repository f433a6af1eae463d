use crate::net::transport::NetHandle;
use hashbrown::HashMap;
use photon::logging::{self, Logger};
use photon::wire::Message;
use photon::ClientId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Tuning knobs for the cooperative reliability layer.
#[derive(Debug, Clone, Copy)]
pub struct ReliabilityConfig {
    pub max_retries: u32,
    pub retry_timeout: Duration,
    pub reorder_window: u32,
    pub reorder_grace: Duration,
    pub duplicate_cache_size: usize,
    pub duplicate_ttl: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> ReliabilityConfig {
        ReliabilityConfig {
            max_retries: 3,
            retry_timeout: Duration::from_millis(200),
            reorder_window: 64,
            reorder_grace: Duration::from_millis(500),
            duplicate_cache_size: 256,
            duplicate_ttl: Duration::from_secs(5),
        }
    }
}

/// A reliable frame awaiting its ACK, retained for retransmission.
#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub seq: u32,
    pub opcode: u8,
    pub bytes: Vec<u8>,
    pub sent_at: Instant,
    pub retries: u32,
}

#[derive(Debug)]
struct BufferedPacket<P> {
    payload: P,
    received_at: Instant,
}

/// Per-client sequencing state for both directions: outgoing pending
/// packets and the incoming reorder window plus duplicate cache.
///
/// Generic over the buffered payload so the state machine is testable
/// without wire frames.
#[derive(Debug)]
pub struct ClientFlow<P> {
    config: ReliabilityConfig,

    next_send_seq: u32,
    pending: VecDeque<PendingPacket>,

    expected_recv_seq: u32,
    reorder: HashMap<u32, BufferedPacket<P>>,
    dup_seen: HashMap<u32, Instant>,
}

impl<P> ClientFlow<P> {
    pub fn new(config: ReliabilityConfig) -> ClientFlow<P> {
        ClientFlow {
            config,
            next_send_seq: 1,
            pending: VecDeque::new(),
            expected_recv_seq: 1,
            reorder: HashMap::new(),
            dup_seen: HashMap::new(),
        }
    }

    #[inline]
    pub fn next_send_seq(&mut self) -> u32 {
        let seq = self.next_send_seq;
        self.next_send_seq += 1;
        seq
    }

    /// Records an outgoing reliable frame for retransmission.
    pub fn track(&mut self, seq: u32, opcode: u8, bytes: Vec<u8>, now: Instant) {
        self.pending.push_back(PendingPacket {
            seq,
            opcode,
            bytes,
            sent_at: now,
            retries: 0,
        });
    }

    /// Removes the pending record matching an ACK. Returns false for an
    /// unknown (already acked or never sent) sequence.
    pub fn acknowledge(&mut self, seq: u32) -> bool {
        let before = self.pending.len();
        self.pending.retain(|packet| packet.seq != seq);
        self.pending.len() != before
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn expected_recv_seq(&self) -> u32 {
        self.expected_recv_seq
    }

    #[inline]
    pub fn reorder_len(&self) -> usize {
        self.reorder.len()
    }

    fn in_window(&self, seq: u32) -> bool {
        seq >= self.expected_recv_seq
            && seq < self.expected_recv_seq + self.config.reorder_window
    }

    /// Checks and records a sequence in the duplicate cache. The cache is
    /// TTL-expired on every call and size-bounded by evicting its lowest
    /// cached sequence.
    fn is_duplicate(&mut self, seq: u32, now: Instant) -> bool {
        let ttl = self.config.duplicate_ttl;
        self.dup_seen
            .retain(|_, seen| now.duration_since(*seen) < ttl);

        if self.dup_seen.contains_key(&seq) {
            return true;
        }

        self.dup_seen.insert(seq, now);

        if self.dup_seen.len() > self.config.duplicate_cache_size {
            if let Some(lowest) = self.dup_seen.keys().min().copied() {
                self.dup_seen.remove(&lowest);
            }
        }

        false
    }

    /// Runs one incoming reliable frame through dedup, window check, and
    /// in-order delivery. Returns the payloads that became deliverable, in
    /// the sender's send order.
    pub fn process_received(&mut self, seq: u32, payload: P, now: Instant) -> Vec<P> {
        let mut ready = Vec::new();

        if self.is_duplicate(seq, now) {
            return ready;
        }

        if !self.in_window(seq) {
            return ready;
        }

        if seq == self.expected_recv_seq {
            ready.push(payload);
            self.expected_recv_seq += 1;

            // Drain whatever became contiguous.
            while let Some(buffered) = self.reorder.remove(&self.expected_recv_seq) {
                ready.push(buffered.payload);
                self.expected_recv_seq += 1;
            }
        } else {
            self.reorder.insert(
                seq,
                BufferedPacket {
                    payload,
                    received_at: now,
                },
            );
        }

        let grace = self.config.reorder_grace;
        self.reorder
            .retain(|_, buffered| now.duration_since(buffered.received_at) < grace);

        ready
    }

    /// Collects the frames due for retransmission, bumping their retry
    /// counters, and the sequences dropped for exceeding the retry budget.
    pub fn due_retransmits(&mut self, now: Instant) -> (Vec<(u32, Vec<u8>)>, Vec<u32>) {
        let mut resend = Vec::new();
        let mut dropped = Vec::new();

        for packet in self.pending.iter_mut() {
            if now.duration_since(packet.sent_at) < self.config.retry_timeout {
                continue;
            }

            packet.sent_at = now;
            packet.retries += 1;
            resend.push((packet.seq, packet.bytes.clone()));

            if packet.retries >= self.config.max_retries {
                dropped.push(packet.seq);
            }
        }

        if !dropped.is_empty() {
            self.pending.retain(|packet| !dropped.contains(&packet.seq));
        }

        (resend, dropped)
    }

    pub fn reset(&mut self) {
        self.next_send_seq = 1;
        self.expected_recv_seq = 1;
        self.pending.clear();
        self.reorder.clear();
        self.dup_seen.clear();
    }
}

/// All per-client flows behind one mutex, shared by the simulation task and
/// the retry worker.
///
/// Lock order: this lock may be taken first and the client-registry lock
/// nested inside it (sends resolve endpoints); never the reverse.
pub struct Reliability {
    flows: Mutex<HashMap<ClientId, ClientFlow<Message>>>,
    config: ReliabilityConfig,
    log: Logger,
}

impl Reliability {
    pub fn new(config: ReliabilityConfig, log: &Logger) -> Reliability {
        Reliability {
            flows: Mutex::new(HashMap::new()),
            config,
            log: log.new(logging::o!("layer" => "reliability")),
        }
    }

    fn lock(&self) -> MutexGuard<HashMap<ClientId, ClientFlow<Message>>> {
        match self.flows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Frames, tracks, and transmits a reliable message. Returns the
    /// assigned sequence id.
    pub fn send(
        &self,
        net: &NetHandle,
        client_id: ClientId,
        message: &Message,
        now: Instant,
    ) -> u32 {
        let config = self.config;
        let mut flows = self.lock();
        let flow = flows
            .entry(client_id)
            .or_insert_with(|| ClientFlow::new(config));

        let seq = flow.next_send_seq();
        let bytes = message.encode_reliable(seq);
        flow.track(seq, message.opcode() as u8, bytes.clone(), now);
        drop(flows);

        net.send_to(client_id, bytes);
        seq
    }

    /// Sends one reliable message to each listed client, each on its own
    /// sequence stream.
    pub fn send_to_many(
        &self,
        net: &NetHandle,
        client_ids: &[ClientId],
        message: &Message,
        now: Instant,
    ) {
        for &client_id in client_ids {
            self.send(net, client_id, message, now);
        }
    }

    pub fn handle_ack(&self, client_id: ClientId, seq: u32) -> bool {
        let mut flows = self.lock();
        match flows.get_mut(&client_id) {
            Some(flow) => {
                let known = flow.acknowledge(seq);
                logging::trace!(self.log, "ack received";
                                "client_id" => client_id,
                                "seq" => seq,
                                "known" => known);
                known
            }
            None => false,
        }
    }

    /// Feeds one received reliable frame into the client's flow and returns
    /// the messages that became deliverable, in send order.
    pub fn deliver(
        &self,
        client_id: ClientId,
        seq: u32,
        message: Message,
        now: Instant,
    ) -> Vec<Message> {
        let config = self.config;
        let mut flows = self.lock();
        let flow = flows
            .entry(client_id)
            .or_insert_with(|| ClientFlow::new(config));

        flow.process_received(seq, message, now)
    }

    pub fn remove_client(&self, client_id: ClientId) {
        self.lock().remove(&client_id);
    }

    pub fn has_pending(&self) -> bool {
        self.lock().values().any(|flow| flow.pending_len() > 0)
    }

    /// One retransmission sweep over every flow. Returns the number of
    /// frames re-sent.
    pub fn retry_pass(&self, net: &NetHandle, now: Instant) -> usize {
        let mut resent = 0;
        let mut flows = self.lock();

        for (&client_id, flow) in flows.iter_mut() {
            let (resend, dropped) = flow.due_retransmits(now);

            for (seq, bytes) in resend {
                logging::trace!(self.log, "retransmitting";
                                "client_id" => client_id,
                                "seq" => seq);
                net.send_to(client_id, bytes);
                resent += 1;
            }

            for seq in dropped {
                // Soft failure: the client may be dead, inactivity eviction
                // will reap it.
                logging::warn!(self.log, "reliable frame dropped after max retries";
                               "client_id" => client_id,
                               "seq" => seq);
            }
        }

        resent
    }
}

/// Spawns the dedicated retry worker. Wakes at roughly 20 Hz and rescans
/// the pending lists; terminates when the stop flag clears.
pub fn spawn_retry_worker(
    reliability: Arc<Reliability>,
    net: NetHandle,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("retry-worker".into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                reliability.retry_pass(&net, Instant::now());
                thread::sleep(Duration::from_millis(50));
            }
        })
        .expect("failed to spawn retry worker")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> ClientFlow<u32> {
        ClientFlow::new(ReliabilityConfig::default())
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_send_seq_monotone_from_one() {
        let mut flow = flow();

        assert_eq!(flow.next_send_seq(), 1);
        assert_eq!(flow.next_send_seq(), 2);
        assert_eq!(flow.next_send_seq(), 3);
    }

    #[test]
    fn test_ack_removes_pending() {
        let mut flow = flow();
        let now = Instant::now();

        flow.track(1, 0x06, vec![1], now);
        flow.track(2, 0x06, vec![2], now);

        assert!(flow.acknowledge(1));
        assert_eq!(flow.pending_len(), 1);
        assert!(!flow.acknowledge(1));
        assert!(!flow.acknowledge(9));
    }

    #[test]
    fn test_in_order_delivery() {
        let mut flow = flow();
        let now = Instant::now();

        assert_eq!(flow.process_received(1, 10, now), vec![10]);
        assert_eq!(flow.process_received(2, 20, now), vec![20]);
        assert_eq!(flow.expected_recv_seq(), 3);
    }

    #[test]
    fn test_reorder_one_three_two() {
        let mut flow = flow();
        let now = Instant::now();

        assert_eq!(flow.process_received(1, 10, now), vec![10]);
        assert_eq!(flow.process_received(3, 30, now), Vec::<u32>::new());
        // 2 releases itself and the buffered 3, in send order.
        assert_eq!(flow.process_received(2, 20, now), vec![20, 30]);
        assert_eq!(flow.reorder_len(), 0);
        assert_eq!(flow.expected_recv_seq(), 4);
    }

    #[test]
    fn test_reorder_five_seven_six() {
        let mut flow = flow();
        let now = Instant::now();

        for seq in 1..5 {
            flow.process_received(seq, seq, now);
        }

        assert_eq!(flow.process_received(5, 5, now), vec![5]);
        assert_eq!(flow.process_received(7, 7, now), Vec::<u32>::new());
        assert_eq!(flow.process_received(6, 6, now), vec![6, 7]);
        assert_eq!(flow.reorder_len(), 0);
    }

    #[test]
    fn test_window_boundaries() {
        let mut flow = flow();
        let now = Instant::now();
        let window = ReliabilityConfig::default().reorder_window;

        // expected + W is outside the half-open window and dropped.
        assert_eq!(flow.process_received(1 + window, 99, now), Vec::<u32>::new());
        assert_eq!(flow.reorder_len(), 0);

        // expected + W - 1 is the last buffered seq.
        assert_eq!(flow.process_received(window, 88, now), Vec::<u32>::new());
        assert_eq!(flow.reorder_len(), 1);

        // Below the window (already delivered range) is dropped too.
        flow.process_received(1, 1, now);
        assert_eq!(flow.process_received(0, 0, now), Vec::<u32>::new());
    }

    #[test]
    fn test_duplicate_suppressed_within_ttl() {
        let mut flow = flow();
        let now = Instant::now();

        assert_eq!(flow.process_received(1, 10, now), vec![10]);
        assert_eq!(flow.process_received(1, 10, now + ms(100)), Vec::<u32>::new());
    }

    #[test]
    fn test_duplicate_fresh_after_ttl() {
        let mut flow = flow();
        let now = Instant::now();

        // 2 gets buffered ahead of order, then evicted by the reorder grace.
        flow.process_received(2, 20, now);
        flow.process_received(3, 30, now + ms(600));
        assert!(!flow.reorder.contains_key(&2));

        // Past the TTL the cache forgets seq 2, so its retransmission is
        // fresh again and can be buffered and delivered.
        let later = now + Duration::from_secs(6);
        flow.process_received(2, 20, later);
        assert!(flow.reorder.contains_key(&2));
        assert_eq!(flow.process_received(1, 10, later), vec![10, 20]);
    }

    #[test]
    fn test_duplicate_cache_size_bound_evicts_lowest_seq() {
        let mut config = ReliabilityConfig::default();
        config.duplicate_cache_size = 3;
        config.reorder_window = 1000;
        let mut flow: ClientFlow<u32> = ClientFlow::new(config);
        let now = Instant::now();

        // A high seq arrives first, lower ones trickle in after it.
        flow.process_received(50, 50, now);
        flow.process_received(10, 10, now + ms(1));
        flow.process_received(20, 20, now + ms(2));
        flow.process_received(30, 30, now + ms(3));

        // Overflow evicts the lowest cached seq, not the oldest arrival:
        // 50 stays even though it was seen first.
        assert_eq!(flow.dup_seen.len(), 3);
        assert!(!flow.dup_seen.contains_key(&10));
        assert!(flow.dup_seen.contains_key(&20));
        assert!(flow.dup_seen.contains_key(&30));
        assert!(flow.dup_seen.contains_key(&50));
    }

    #[test]
    fn test_reorder_grace_eviction() {
        let mut flow = flow();
        let now = Instant::now();

        flow.process_received(3, 30, now);
        assert_eq!(flow.reorder_len(), 1);

        // Another arrival a full grace later sweeps the stale entry.
        flow.process_received(5, 50, now + ms(600));
        assert_eq!(flow.reorder_len(), 1);

        // 1 and 2 now only release themselves; 3 was discarded.
        assert_eq!(flow.process_received(1, 10, now + ms(650)), vec![10]);
        assert_eq!(flow.process_received(2, 20, now + ms(650)), vec![20]);
        assert_eq!(flow.expected_recv_seq(), 3);
    }

    #[test]
    fn test_retransmit_schedule_and_drop() {
        let mut flow = flow();
        let now = Instant::now();

        flow.track(7, 0x06, vec![7, 7], now);

        // Not due yet.
        let (resend, dropped) = flow.due_retransmits(now + ms(100));
        assert!(resend.is_empty() && dropped.is_empty());

        // First retry at 200 ms: the same bytes go out again.
        let (resend, dropped) = flow.due_retransmits(now + ms(200));
        assert_eq!(resend, vec![(7, vec![7, 7])]);
        assert!(dropped.is_empty());

        // Second retry.
        let (resend, dropped) = flow.due_retransmits(now + ms(400));
        assert_eq!(resend.len(), 1);
        assert!(dropped.is_empty());

        // Third retry exhausts the budget; the packet leaves the pending
        // list for good.
        let (resend, dropped) = flow.due_retransmits(now + ms(600));
        assert_eq!(resend.len(), 1);
        assert_eq!(dropped, vec![7]);
        assert_eq!(flow.pending_len(), 0);

        let (resend, dropped) = flow.due_retransmits(now + ms(800));
        assert!(resend.is_empty() && dropped.is_empty());
    }

    #[test]
    fn test_retransmit_skips_acked() {
        let mut flow = flow();
        let now = Instant::now();

        flow.track(1, 0x06, vec![1], now);
        flow.track(2, 0x06, vec![2], now);
        flow.acknowledge(1);

        let (resend, _) = flow.due_retransmits(now + ms(250));
        assert_eq!(resend, vec![(2, vec![2])]);
    }

    #[test]
    fn test_reset() {
        let mut flow = flow();
        let now = Instant::now();

        flow.next_send_seq();
        flow.track(1, 0x06, vec![1], now);
        flow.process_received(1, 10, now);
        flow.process_received(5, 50, now);

        flow.reset();

        assert_eq!(flow.next_send_seq(), 1);
        assert_eq!(flow.expected_recv_seq(), 1);
        assert_eq!(flow.pending_len(), 0);
        assert_eq!(flow.reorder_len(), 0);
    }
}
