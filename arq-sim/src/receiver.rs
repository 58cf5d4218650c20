//! Receiving endpoint: turns arriving DATA into ACKs and measures what
//! actually got through.
//!
//! The acknowledgement behavior depends on what the peer sender expects:
//!
//! | Mode         | Accepts          | Replies with                        |
//! |--------------|------------------|-------------------------------------|
//! | none         | everything       | nothing                             |
//! | selective    | everything       | one ACK per DATA, same id           |
//! | cumulative   | next expected id | ACK carrying the largest in-order id |
//!
//! The cumulative receiver is Go-Back-N: anything out of order is discarded
//! and re-acknowledged with the unchanged in-order id.  Before id 0 has
//! arrived there is no in-order id to report, so it stays silent.
//!
//! Delay is measured once per id, at first receipt, as `now − gen_time`.

use std::collections::HashSet;

use log::trace;

use crate::config::AckDiscipline;
use crate::packet::{HostId, Packet, PacketId, Tick};
use crate::utility::Utility;

/// One sample of the per-tick history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub tick: Tick,
    pub delivered: u64,
    pub utility: f64,
}

#[derive(Debug)]
pub struct Receiver {
    host: HostId,
    mode: Option<AckDiscipline>,
    /// Next in-order id (cumulative mode).
    next_expected: PacketId,
    /// Ids received at least once (other modes).
    seen: HashSet<PacketId>,
    highest_id: Option<PacketId>,
    accepted: u64,
    delay_sum: u64,
    history: Vec<HistoryPoint>,
}

impl Receiver {
    /// `mode = None` never acknowledges anything.
    pub fn new(host: HostId, mode: Option<AckDiscipline>) -> Self {
        Self {
            host,
            mode,
            next_expected: 0,
            seen: HashSet::new(),
            highest_id: None,
            accepted: 0,
            delay_sum: 0,
            history: Vec::new(),
        }
    }

    /// Consume DATA addressed to this host; returns the ACKs to send back.
    pub fn receive(&mut self, packets: &[Packet], now: Tick) -> Vec<Packet> {
        let host = self.host;
        let mut acks = Vec::new();
        for pkt in packets.iter().filter(|p| p.is_data() && p.dest == host) {
            self.highest_id = Some(self.highest_id.map_or(pkt.id, |h| h.max(pkt.id)));

            match self.mode {
                Some(AckDiscipline::Cumulative) => {
                    if pkt.id == self.next_expected {
                        self.accept(pkt, now);
                        self.next_expected += 1;
                    } else {
                        trace!("[rx {}] out of order {} (want {})", self.host, pkt.id, self.next_expected);
                    }
                    if let Some(in_order) = self.next_expected.checked_sub(1) {
                        acks.push(pkt.ack(in_order));
                    }
                }
                Some(AckDiscipline::Selective) => {
                    if self.seen.insert(pkt.id) {
                        self.accept(pkt, now);
                    }
                    acks.push(pkt.ack(pkt.id));
                }
                None => {
                    if self.seen.insert(pkt.id) {
                        self.accept(pkt, now);
                    }
                }
            }
        }
        acks
    }

    fn accept(&mut self, pkt: &Packet, now: Tick) {
        self.accepted += 1;
        self.delay_sum += now.saturating_sub(pkt.gen_time);
    }

    /// Append a history sample scored with `utility`.
    pub fn record_tick(&mut self, now: Tick, utility: &Utility) {
        let score = utility.score(self.delivery_rate(None), self.mean_delay());
        self.history.push(HistoryPoint {
            tick: now,
            delivered: self.delivered(),
            utility: score,
        });
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// Distinct packets delivered.  In cumulative mode this is the length
    /// of the in-order prefix.
    pub fn delivered(&self) -> u64 {
        self.accepted
    }

    /// Delivered over `distinct_sent` when the sender's count is known,
    /// otherwise over `highest id seen + 1`.
    pub fn delivery_rate(&self, distinct_sent: Option<u64>) -> f64 {
        let denominator = match distinct_sent {
            Some(n) => n,
            None => self.highest_id.map_or(0, |h| h + 1),
        };
        if denominator == 0 {
            0.0
        } else {
            self.delivered() as f64 / denominator as f64
        }
    }

    pub fn mean_delay(&self) -> f64 {
        if self.accepted == 0 {
            0.0
        } else {
            self.delay_sum as f64 / self.accepted as f64
        }
    }

    pub fn highest_id(&self) -> Option<PacketId> {
        self.highest_id
    }

    pub fn history(&self) -> &[HistoryPoint] {
        &self.history
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
