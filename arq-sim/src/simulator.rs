//! The tick loop tying flows and the shared channel together.
//!
//! Each tick runs four phases in a fixed order:
//!
//! | Phase | What happens                                                        |
//! |-------|---------------------------------------------------------------------|
//! | 1     | The channel releases up to `throughput` packets.                    |
//! | 2     | Receivers consume them and produce ACKs (random receiver order).    |
//! | 3     | Generators feed backlogs; connections tick on their ACKs plus the   |
//! |       | NACKs the channel produced last tick (random connection order).     |
//! | 4     | The channel admits everything emitted; its NACKs wait a tick.       |
//!
//! ACKs travel straight back to the sender; only DATA goes through the
//! channel.  The whole loop is single-threaded and deterministic for a fixed
//! seed.

use std::collections::HashMap;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::channel::{Channel, ChannelStats};
use crate::config::{FlowConfig, PolicyConfig, ProtocolConfig, Scenario, TrafficConfig};
use crate::connection::Connection;
use crate::error::ConfigError;
use crate::packet::{HostId, Packet, Tick};
use crate::receiver::{HistoryPoint, Receiver};
use crate::traffic::TrafficGenerator;
use crate::utility::Utility;

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// One sender/receiver pair and everything attached to it.
#[derive(Debug)]
pub struct Flow {
    label: String,
    protocol: String,
    client: HostId,
    server: HostId,
    traffic: TrafficGenerator,
    connection: Connection,
    receiver: Receiver,
    /// ACKs and NACKs waiting for the connection's next tick.
    feedback: Vec<Packet>,
}

impl Flow {
    fn new(config: &FlowConfig, seed: Option<u64>) -> Result<Self, ConfigError> {
        let mut traffic = config.traffic.clone();
        if let (TrafficConfig::Poisson(p), Some(seed)) = (&mut traffic, seed) {
            p.seed.get_or_insert(seed);
        }
        let mut protocol = config.protocol.clone();
        if let (ProtocolConfig::Adaptive(a), Some(seed)) = (&mut protocol, seed) {
            if let PolicyConfig::QLearning(q) = &mut a.policy {
                q.seed.get_or_insert(seed);
            }
        }
        Ok(Self {
            label: config.label(),
            protocol: config.protocol.label(),
            client: config.client,
            server: config.server,
            traffic: TrafficGenerator::new(&traffic, config.client, config.server)?,
            connection: Connection::new(&protocol, config.backlog_capacity)?,
            receiver: Receiver::new(config.server, config.protocol.ack_discipline()),
            feedback: Vec::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn history(&self) -> &[HistoryPoint] {
        self.receiver.history()
    }

    fn report(&self) -> FlowReport {
        let stats = self.connection.stats();
        FlowReport {
            label: self.label.clone(),
            protocol: self.protocol.clone(),
            client: self.client,
            server: self.server,
            generated: self.traffic.generated(),
            sent: stats.new_sent,
            retransmissions: stats.retransmissions,
            delivered: self.receiver.delivered(),
            delivery_rate: self.receiver.delivery_rate(Some(stats.new_sent)),
            mean_delay: self.receiver.mean_delay(),
            abandoned: stats.abandoned + stats.abandoned_by_policy,
            clipped: stats.clipped,
            utility: self.receiver.history().last().map_or(0.0, |h| h.utility),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub label: String,
    pub protocol: String,
    pub client: HostId,
    pub server: HostId,
    pub generated: u64,
    /// Distinct packets the sender put on the channel.
    pub sent: u64,
    pub retransmissions: u64,
    /// Distinct packets the receiver accepted.
    pub delivered: u64,
    /// `delivered / sent`.
    pub delivery_rate: f64,
    pub mean_delay: f64,
    /// Given up, by limits or by policy.
    pub abandoned: u64,
    pub clipped: u64,
    /// Last per-tick utility sample.
    pub utility: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub ticks: Tick,
    pub flows: Vec<FlowReport>,
    pub channel: ChannelStats,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "after {} ticks", self.ticks)?;
        writeln!(
            f,
            "{:<22} {:>8} {:>8} {:>8} {:>8} {:>7} {:>9} {:>8} {:>8}",
            "flow", "gen", "sent", "retx", "deliv", "rate", "delay", "gave-up", "utility"
        )?;
        for r in &self.flows {
            writeln!(
                f,
                "{:<22} {:>8} {:>8} {:>8} {:>8} {:>7.3} {:>9.2} {:>8} {:>8.4}",
                r.label,
                r.generated,
                r.sent,
                r.retransmissions,
                r.delivered,
                r.delivery_rate,
                r.mean_delay,
                r.abandoned,
                r.utility
            )?;
        }
        write!(
            f,
            "channel: enq={} deq={} lost={} full={} peak={}",
            self.channel.enqueued,
            self.channel.dequeued,
            self.channel.lost,
            self.channel.overflowed,
            self.channel.peak_occupancy
        )
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Simulation {
    now: Tick,
    ticks: Tick,
    channel: Channel,
    flows: Vec<Flow>,
    /// Client host → index into `flows`.  Hosts are unique per scenario.
    by_client: HashMap<HostId, usize>,
    /// Shuffles flow order within a phase.
    rng: StdRng,
    utility: Utility,
}

impl Simulation {
    pub fn new(scenario: &Scenario) -> Result<Self, ConfigError> {
        scenario.validate()?;

        let mut channel_config = scenario.channel.clone();
        if channel_config.seed.is_none() {
            channel_config.seed = scenario.seed.map(|s| s.wrapping_add(1));
        }
        let channel = Channel::new(&channel_config)?;

        let flows = scenario
            .flows
            .iter()
            .enumerate()
            .map(|(i, f)| Flow::new(f, scenario.seed.map(|s| s.wrapping_add(2 + i as u64))))
            .collect::<Result<Vec<_>, _>>()?;

        let by_client = flows.iter().enumerate().map(|(i, f)| (f.client, i)).collect();

        let rng = match scenario.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            now: 0,
            ticks: scenario.ticks,
            channel,
            flows,
            by_client,
            rng,
            utility: Utility::new(scenario.utility_weights, scenario.delay_scale),
        })
    }

    /// Run one tick through all four phases.
    pub fn step(&mut self) {
        self.now += 1;
        let now = self.now;

        let arrived = self.channel.release(now);

        let mut order: Vec<usize> = (0..self.flows.len()).collect();
        order.shuffle(&mut self.rng);
        for &i in &order {
            let flow = &mut self.flows[i];
            let acks = flow.receiver.receive(&arrived, now);
            flow.feedback.extend(acks);
        }

        order.shuffle(&mut self.rng);
        let mut emitted = Vec::new();
        for &i in &order {
            let flow = &mut self.flows[i];
            let fresh = flow.traffic.generate(now);
            flow.connection.submit(fresh);
            let feedback = std::mem::take(&mut flow.feedback);
            emitted.extend(flow.connection.tick(&feedback));
        }

        for nack in self.channel.enqueue(emitted, now) {
            if let Some(&i) = self.by_client.get(&nack.dest) {
                self.flows[i].feedback.push(nack);
            }
        }

        for flow in &mut self.flows {
            flow.receiver.record_tick(now, &self.utility);
        }
    }

    /// Run the configured number of ticks and report.
    pub fn run(&mut self) -> Report {
        let progress_every = (self.ticks / 10).max(1);
        for _ in 0..self.ticks {
            self.step();
            if self.now % progress_every == 0 {
                info!(
                    "tick {}/{} ({}% done), channel queue {}",
                    self.now,
                    self.ticks,
                    self.now * 100 / self.ticks.max(1),
                    self.channel.len()
                );
            }
        }
        self.report()
    }

    pub fn report(&self) -> Report {
        Report {
            ticks: self.now,
            flows: self.flows.iter().map(Flow::report).collect(),
            channel: *self.channel.stats(),
        }
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
