//! Per-connection send-side state and the protocol dispatch enum.
//!
//! [`ConnectionState`] is what every protocol shares:
//! - a FIFO transmit backlog, optionally bounded (producers are clipped,
//!   never blocked);
//! - the [`InFlightTable`] of unresolved packets;
//! - the [`RttEstimator`];
//! - attempt and retention limits;
//! - the tick counter, advanced at the start of every `tick`;
//! - client-side [`ConnectionStats`].
//!
//! Protocols own one `ConnectionState` each and drive it from their `tick`.
//! [`Connection`] is the closed set of protocols the simulator can run.

use std::collections::VecDeque;

use log::debug;

use crate::adaptive::Adaptive;
use crate::config::{Limit, ProtocolConfig};
use crate::error::ConfigError;
use crate::inflight::{InFlightRecord, InFlightTable};
use crate::newreno::NewReno;
use crate::packet::{Packet, PacketId, Tick};
use crate::plain::Plain;
use crate::rto::RttEstimator;
use crate::window_arq::WindowArq;

// ---------------------------------------------------------------------------
// Limits and statistics
// ---------------------------------------------------------------------------

/// Timeout and give-up thresholds of one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Initial RTO; disabled turns off timeout-driven retransmission.
    pub timeout: Limit,
    pub max_attempts: Limit,
    /// Maximum ticks since the first transmission.
    pub max_retention: Limit,
}

/// Client-side counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// First transmissions (distinct packets sent).
    pub new_sent: u64,
    pub retransmissions: u64,
    /// Records resolved by an acknowledgement.
    pub delivered: u64,
    /// Records dropped because an attempt or retention limit was reached.
    pub abandoned: u64,
    /// Records dropped because the decision policy chose to.
    pub abandoned_by_policy: u64,
    /// Packets refused by a full backlog.
    pub clipped: u64,
    pub highest_id: Option<PacketId>,
    /// Sum over acknowledged records of `ack tick − gen_time`.
    pub delay_sum: u64,
}

impl ConnectionStats {
    pub fn transmissions(&self) -> u64 {
        self.new_sent + self.retransmissions
    }

    /// `delivered / (highest id sent + 1)`.
    pub fn delivery_rate(&self) -> f64 {
        match self.highest_id {
            Some(id) => self.delivered as f64 / (id + 1) as f64,
            None => 0.0,
        }
    }

    pub fn mean_delay(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.delay_sum as f64 / self.delivered as f64
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ConnectionState {
    /// Log prefix.
    tag: &'static str,
    backlog: VecDeque<Packet>,
    backlog_capacity: Option<usize>,
    inflight: InFlightTable,
    rtt: RttEstimator,
    limits: Limits,
    now: Tick,
    stats: ConnectionStats,
}

impl ConnectionState {
    pub fn new(tag: &'static str, limits: Limits, backlog_capacity: Option<usize>) -> Self {
        Self {
            tag,
            backlog: VecDeque::new(),
            backlog_capacity,
            inflight: InFlightTable::new(),
            rtt: RttEstimator::new(limits.timeout),
            limits,
            now: 0,
            stats: ConnectionStats::default(),
        }
    }

    /// Append to the backlog.  Returns how many packets were accepted; the
    /// rest are dropped and counted as clipped.
    pub fn submit(&mut self, packets: Vec<Packet>) -> usize {
        let offered = packets.len();
        let room = match self.backlog_capacity {
            Some(cap) => cap.saturating_sub(self.backlog.len()),
            None => usize::MAX,
        };
        self.backlog.extend(packets.into_iter().take(room));
        let accepted = offered.min(room);
        self.stats.clipped += (offered - accepted) as u64;
        accepted
    }

    /// Advance the tick counter; returns the new tick.
    pub fn begin_tick(&mut self) -> Tick {
        self.now += 1;
        self.now
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    // -- sending ------------------------------------------------------------

    /// First transmission of the next backlog packet, tracked in flight.
    pub fn send_new(&mut self) -> Option<Packet> {
        let packet = self.backlog.pop_front()?;
        let sent = self.inflight.send_new(packet, self.now);
        self.note_new(&sent);
        Some(sent)
    }

    /// Send the whole backlog without tracking anything.
    pub fn send_untracked(&mut self) -> Vec<Packet> {
        let now = self.now;
        let mut out = Vec::with_capacity(self.backlog.len());
        while let Some(mut packet) = self.backlog.pop_front() {
            packet.send_time = now;
            packet.first_send_time = now;
            packet.attempt = 1;
            self.note_new(&packet);
            out.push(packet);
        }
        out
    }

    fn note_new(&mut self, sent: &Packet) {
        debug!("[{}] → {}", self.tag, sent);
        self.stats.new_sent += 1;
        self.stats.highest_id = Some(self.stats.highest_id.map_or(sent.id, |h| h.max(sent.id)));
    }

    pub fn retransmit(&mut self, id: PacketId) -> Option<Packet> {
        let packet = self.inflight.retransmit(id, self.now)?;
        debug!("[{}] ↻ {}", self.tag, packet);
        self.stats.retransmissions += 1;
        Some(packet)
    }

    // -- resolution ---------------------------------------------------------

    /// Resolve `id` by acknowledgement: RTT sample, delay and delivery
    /// accounting.  `None` if the id is not in flight.
    pub fn acknowledge(&mut self, id: PacketId) -> Option<InFlightRecord> {
        let record = self.inflight.remove(id)?;
        self.rtt
            .record_sample(self.now.saturating_sub(record.last_send_time) as f64);
        self.note_delivered(&record);
        Some(record)
    }

    /// Resolve every record with id `<= id`.  Only the record carrying `id`
    /// itself contributes an RTT sample.
    pub fn acknowledge_through(&mut self, id: PacketId) -> Vec<InFlightRecord> {
        let acked = self.inflight.remove_through(id);
        for record in &acked {
            if record.id() == id {
                self.rtt
                    .record_sample(self.now.saturating_sub(record.last_send_time) as f64);
            }
            self.note_delivered(record);
        }
        acked
    }

    fn note_delivered(&mut self, record: &InFlightRecord) {
        debug!("[{}] ← ACK id={} attempts={}", self.tag, record.id(), record.attempts);
        self.stats.delivered += 1;
        self.stats.delay_sum += self.now.saturating_sub(record.gen_time);
    }

    /// Give up on `id` because a limit was reached.
    pub fn abandon(&mut self, id: PacketId) -> Option<InFlightRecord> {
        let record = self.inflight.remove(id)?;
        debug!("[{}] ✗ id={} abandoned after {} attempts", self.tag, id, record.attempts);
        self.stats.abandoned += 1;
        Some(record)
    }

    /// Give up on `id` because the decision policy said so.
    pub fn abandon_by_policy(&mut self, id: PacketId) -> Option<InFlightRecord> {
        let record = self.inflight.remove(id)?;
        debug!("[{}] ✗ id={} dropped by policy", self.tag, id);
        self.stats.abandoned_by_policy += 1;
        Some(record)
    }

    /// `true` if the record has used up its attempts or retention.
    pub fn over_limits(&self, record: &InFlightRecord) -> bool {
        self.limits.max_attempts.reached_by(u64::from(record.attempts))
            || self.limits.max_retention.reached_by(record.retention(self.now))
    }

    /// Mark every flying record whose RTO expired as not flying.  Returns
    /// the affected ids, ascending.
    pub fn sweep_timeouts(&mut self) -> Vec<PacketId> {
        let mut expired = Vec::new();
        for id in self.inflight.ids() {
            let timed_out = self
                .inflight
                .get(id)
                .is_some_and(|r| r.flying && self.rtt.is_timed_out(self.now, r.last_send_time));
            if timed_out && self.inflight.mark_lost(id) {
                debug!("[{}] ⏱ id={} timed out", self.tag, id);
                expired.push(id);
            }
        }
        expired
    }

    /// Abandon every not-flying record that is over its limits.
    pub fn abandon_over_limits(&mut self) -> Vec<InFlightRecord> {
        let mut dropped = Vec::new();
        for id in self.inflight.not_flying_ids() {
            let over = self.inflight.get(id).is_some_and(|r| self.over_limits(r));
            if over {
                dropped.extend(self.abandon(id));
            }
        }
        dropped
    }

    // -- accessors ----------------------------------------------------------

    pub fn inflight(&self) -> &InFlightTable {
        &self.inflight
    }

    pub fn inflight_mut(&mut self) -> &mut InFlightTable {
        &mut self.inflight
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn rtt_mut(&mut self) -> &mut RttEstimator {
        &mut self.rtt
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One sending endpoint running one of the supported protocols.
#[derive(Debug)]
pub enum Connection {
    Plain(Plain),
    WindowArq(WindowArq),
    NewReno(NewReno),
    Adaptive(Adaptive),
}

impl Connection {
    pub fn new(config: &ProtocolConfig, backlog_capacity: Option<usize>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(match config {
            ProtocolConfig::Plain(c) => Connection::Plain(Plain::new(c, backlog_capacity)),
            ProtocolConfig::WindowArq(c) => {
                Connection::WindowArq(WindowArq::new(c, backlog_capacity))
            }
            ProtocolConfig::NewReno(c) => Connection::NewReno(NewReno::new(c, backlog_capacity)),
            ProtocolConfig::Adaptive(c) => Connection::Adaptive(Adaptive::new(c, backlog_capacity)),
        })
    }

    /// Hand freshly generated packets to the backlog.  Returns the number
    /// accepted.
    pub fn submit(&mut self, packets: Vec<Packet>) -> usize {
        self.base_mut().submit(packets)
    }

    /// Advance one tick.  `feedback` holds the ACKs and NACKs addressed to
    /// this sender; the result is what it puts on the channel.
    pub fn tick(&mut self, feedback: &[Packet]) -> Vec<Packet> {
        match self {
            Connection::Plain(p) => p.tick(feedback),
            Connection::WindowArq(p) => p.tick(feedback),
            Connection::NewReno(p) => p.tick(feedback),
            Connection::Adaptive(p) => p.tick(feedback),
        }
    }

    pub fn base(&self) -> &ConnectionState {
        match self {
            Connection::Plain(p) => p.base(),
            Connection::WindowArq(p) => p.base(),
            Connection::NewReno(p) => p.base(),
            Connection::Adaptive(p) => p.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ConnectionState {
        match self {
            Connection::Plain(p) => p.base_mut(),
            Connection::WindowArq(p) => p.base_mut(),
            Connection::NewReno(p) => p.base_mut(),
            Connection::Adaptive(p) => p.base_mut(),
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.base().stats()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
