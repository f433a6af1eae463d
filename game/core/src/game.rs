//! The fixed-timestep driver. Owns the session and paces it with a lag
//! accumulator; snapshot broadcast and inactive-client eviction run on
//! their own accumulators so their cadences stay independent of the tick
//! rate.

use crate::config::GameConfig;
use crate::session::GameSession;
use graviton::net::{NetHandle, NetworkPacket, Reliability, SafeQueue};
use photon::logging::{self, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const EVICTION_INTERVAL: Duration = Duration::from_secs(1);
/// How long shutdown waits for pending reliable frames to drain.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

pub struct Game {
    session: GameSession,
    net: NetHandle,
    inbound: Arc<SafeQueue<NetworkPacket>>,
    reliability: Arc<Reliability>,

    tick_interval: Duration,
    dt: f32,
    snapshot_interval: Duration,
    inactivity_timeout: Duration,

    log: Logger,
}

impl Game {
    pub fn new(
        config: &GameConfig,
        session: GameSession,
        net: NetHandle,
        inbound: Arc<SafeQueue<NetworkPacket>>,
        reliability: Arc<Reliability>,
        log: &Logger,
    ) -> Game {
        Game {
            session,
            net,
            inbound,
            reliability,
            tick_interval: config.tick_interval(),
            dt: config.tick_interval().as_secs_f32(),
            snapshot_interval: config.snapshot_interval(),
            inactivity_timeout: config.inactivity_timeout(),
            log: log.new(logging::o!("layer" => "game")),
        }
    }

    #[inline]
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    #[inline]
    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }

    /// Runs one simulation step and updates the side accumulators.
    /// Factored out of `run` so tests can drive ticks directly.
    pub fn step(
        &mut self,
        now: Instant,
        snapshot_acc: &mut Duration,
        eviction_acc: &mut Duration,
    ) {
        self.session
            .process_inbound(&self.inbound, &self.net, &self.reliability, now);
        self.session.tick(self.dt, &self.net, &self.reliability, now);

        *snapshot_acc += self.tick_interval;
        if *snapshot_acc >= self.snapshot_interval {
            *snapshot_acc -= self.snapshot_interval;
            self.session.broadcast_snapshot(&self.net);
        }

        *eviction_acc += self.tick_interval;
        if *eviction_acc >= EVICTION_INTERVAL {
            *eviction_acc -= EVICTION_INTERVAL;
            let evicted = self.net.evict_inactive(self.inactivity_timeout, now);
            if !evicted.is_empty() {
                self.session.evict(&evicted, &self.reliability);
            }
        }
    }

    /// The simulation task body: catch-up ticks while the lag accumulator
    /// allows, then sleep out the frame remainder. Returns when the stop
    /// flag clears.
    pub fn run(&mut self, running: &AtomicBool) {
        logging::info!(self.log, "game loop started";
                       "tick_interval" => ?self.tick_interval,
                       "snapshot_interval" => ?self.snapshot_interval);

        let mut previous = Instant::now();
        let mut lag = Duration::from_secs(0);
        let mut snapshot_acc = Duration::from_secs(0);
        let mut eviction_acc = Duration::from_secs(0);

        while running.load(Ordering::Relaxed) {
            let current = Instant::now();
            lag += current.duration_since(previous);
            previous = current;

            while lag >= self.tick_interval {
                self.step(Instant::now(), &mut snapshot_acc, &mut eviction_acc);
                lag -= self.tick_interval;
            }

            let frame = current.elapsed();
            if frame < self.tick_interval {
                thread::sleep(self.tick_interval - frame);
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        logging::info!(self.log, "game loop stopping, notifying clients");

        self.session
            .shutdown(&self.net, &self.reliability, Instant::now());

        // Bounded drain so the final reliable frames get their retries.
        let deadline = Instant::now() + SHUTDOWN_DRAIN;
        while self.reliability.has_pending() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }

        logging::info!(self.log, "game loop stopped");
    }
}
