//! Application traffic sources.
//!
//! A [`TrafficGenerator`] produces fresh DATA packets for one flow, assigning
//! ids from 0 upwards.  It is active from `start_time` until
//! `start_time + last_time` inclusive (forever when `last_time` is disabled).
//!
//! - *Periodic*: a burst of `pkts_per_period` whenever
//!   `(now − start_time) % period == 0`.
//! - *Poisson*: a Poisson(λ)-distributed number of packets every tick.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

use crate::config::{Limit, TrafficConfig};
use crate::error::ConfigError;
use crate::packet::{HostId, Packet, PacketId, Tick};

#[derive(Debug)]
enum Pattern {
    Periodic { period: u64, burst: u32 },
    Poisson { dist: Poisson<f64>, rng: StdRng },
}

#[derive(Debug)]
pub struct TrafficGenerator {
    source: HostId,
    dest: HostId,
    pattern: Pattern,
    start_time: Tick,
    last_time: Limit,
    next_id: PacketId,
}

impl TrafficGenerator {
    pub fn new(config: &TrafficConfig, source: HostId, dest: HostId) -> Result<Self, ConfigError> {
        let (pattern, start_time, last_time) = match config {
            TrafficConfig::Periodic(c) => {
                if c.period == 0 {
                    return Err(ConfigError::invalid("period", "must be at least 1"));
                }
                let pattern = Pattern::Periodic {
                    period: c.period,
                    burst: c.pkts_per_period,
                };
                (pattern, c.start_time, c.last_time)
            }
            TrafficConfig::Poisson(c) => {
                let dist = Poisson::new(c.lambda)
                    .map_err(|e| ConfigError::invalid("lambda", e.to_string()))?;
                let rng = match c.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                (Pattern::Poisson { dist, rng }, c.start_time, c.last_time)
            }
        };
        Ok(Self {
            source,
            dest,
            pattern,
            start_time,
            last_time,
            next_id: 0,
        })
    }

    fn active(&self, now: Tick) -> bool {
        if now < self.start_time {
            return false;
        }
        match self.last_time.get() {
            Some(last) => now - self.start_time <= last,
            None => true,
        }
    }

    /// Packets generated at tick `now`.
    pub fn generate(&mut self, now: Tick) -> Vec<Packet> {
        if !self.active(now) {
            return Vec::new();
        }
        let count = match &mut self.pattern {
            Pattern::Periodic { period, burst } => {
                if (now - self.start_time) % *period == 0 {
                    u64::from(*burst)
                } else {
                    0
                }
            }
            Pattern::Poisson { dist, rng } => dist.sample(rng) as u64,
        };
        (0..count)
            .map(|_| {
                let id = self.next_id;
                self.next_id += 1;
                Packet::data(id, self.source, self.dest, now)
            })
            .collect()
    }

    /// Number of packets generated so far.
    pub fn generated(&self) -> u64 {
        self.next_id
    }
}
