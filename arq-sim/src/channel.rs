//! The shared bottleneck every flow sends through.
//!
//! [`Channel`] is a single FIFO queue with three fault sources:
//!
//! | Fault          | Description                                            |
//! |----------------|--------------------------------------------------------|
//! | Random loss    | Each admitted packet is lost with `drop_probability`.  |
//! | Queue overflow | A packet arriving at a full queue is rejected.         |
//! | Residency      | A packet cannot leave before `min_delay` ticks.        |
//!
//! Both kinds of drop are reported back synchronously as NACKs addressed to
//! the sender.  Nothing is ever dropped silently.
//!
//! Draws come from a `StdRng`; fixing `seed` makes every run reproducible.

use std::collections::{BTreeMap, VecDeque};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ChannelConfig;
use crate::error::ConfigError;
use crate::packet::{HostId, Packet, Tick};

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Per-sender queue accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Packets currently waiting in the queue.
    pub queued: u64,
    pub enqueued: u64,
    pub dequeued: u64,
    /// Lost to random drop.
    pub lost: u64,
    /// Rejected by a full queue.
    pub overflowed: u64,
}

/// Channel-wide totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub lost: u64,
    pub overflowed: u64,
    /// Largest queue occupancy observed.
    pub peak_occupancy: usize,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Channel {
    /// Packets released per tick.
    throughput: usize,
    /// `None` = unbounded.
    capacity: Option<usize>,
    drop_probability: f64,
    min_delay: Tick,
    queue: VecDeque<(Packet, Tick)>,
    rng: StdRng,
    stats: ChannelStats,
    profile: BTreeMap<HostId, UserProfile>,
}

impl Channel {
    pub fn new(config: &ChannelConfig) -> Result<Self, ConfigError> {
        if config.throughput <= 0 {
            return Err(ConfigError::invalid("throughput", "must be positive"));
        }
        if config.capacity < 0 {
            return Err(ConfigError::invalid(
                "capacity",
                "must be non-negative (0 = unbounded)",
            ));
        }
        if !(0.0..=1.0).contains(&config.drop_probability) {
            return Err(ConfigError::invalid("dropProbability", "must lie in [0, 1]"));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            throughput: config.throughput as usize,
            capacity: (config.capacity > 0).then_some(config.capacity as usize),
            drop_probability: config.drop_probability,
            min_delay: config.min_delay,
            queue: VecDeque::new(),
            rng,
            stats: ChannelStats::default(),
            profile: BTreeMap::new(),
        })
    }

    /// Offer `packets` to the channel at tick `now`.
    ///
    /// Returns one NACK for every packet that was lost or rejected, in input
    /// order.  Each packet is judged independently.
    pub fn enqueue(&mut self, packets: Vec<Packet>, now: Tick) -> Vec<Packet> {
        let mut nacks = Vec::new();
        for packet in packets {
            let user = self.profile.entry(packet.source).or_default();

            let u: f64 = self.rng.random();
            if u < self.drop_probability {
                trace!("[channel] lost {packet}");
                user.lost += 1;
                self.stats.lost += 1;
                nacks.push(packet.nack());
                continue;
            }

            if self.capacity.is_some_and(|cap| self.queue.len() >= cap) {
                trace!("[channel] full, rejected {packet}");
                user.overflowed += 1;
                self.stats.overflowed += 1;
                nacks.push(packet.nack());
                continue;
            }

            user.enqueued += 1;
            user.queued += 1;
            self.stats.enqueued += 1;
            self.queue.push_back((packet, now));
            self.stats.peak_occupancy = self.stats.peak_occupancy.max(self.queue.len());
        }
        nacks
    }

    /// Release up to `max_count` packets from the head whose residency has
    /// reached `min_delay`.  Stops at the first packet that is too young.
    pub fn dequeue(&mut self, now: Tick, max_count: usize) -> Vec<Packet> {
        let mut out = Vec::new();
        while out.len() < max_count {
            match self.queue.front() {
                Some((_, enqueued_at)) if now.saturating_sub(*enqueued_at) >= self.min_delay => {}
                _ => break,
            }
            let Some((packet, _)) = self.queue.pop_front() else {
                break;
            };
            if let Some(user) = self.profile.get_mut(&packet.source) {
                user.queued -= 1;
                user.dequeued += 1;
            }
            self.stats.dequeued += 1;
            out.push(packet);
        }
        out
    }

    /// One tick's worth of output at the configured throughput.
    pub fn release(&mut self, now: Tick) -> Vec<Packet> {
        self.dequeue(now, self.throughput)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn throughput(&self) -> usize {
        self.throughput
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Accounting per sending host, ordered by host id.
    pub fn profile(&self) -> &BTreeMap<HostId, UserProfile> {
        &self.profile
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "channel: queued={} enq={} deq={} lost={} full={} peak={}",
            self.queue.len(),
            self.stats.enqueued,
            self.stats.dequeued,
            self.stats.lost,
            self.stats.overflowed,
            self.stats.peak_occupancy
        )?;
        for (host, p) in &self.profile {
            write!(
                f,
                "\n  host {host}: inBuf={} enq={} deq={} lost={} full={}",
                p.queued, p.enqueued, p.dequeued, p.lost, p.overflowed
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
