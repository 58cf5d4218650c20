//! NewReno-style congestion control over cumulative ACKs.
//!
//! Window sizes count packets.  The receiver answers every DATA packet with
//! the largest in-order id it holds, so a repeated ACK id means something
//! after it went missing.
//!
//! | Event                          | Effect                                        |
//! |--------------------------------|-----------------------------------------------|
//! | new ACK, SLOW_START            | `cwnd += 1`, to CA once `cwnd ≥ ssthresh`     |
//! | new ACK, CONGESTION_AVOIDANCE  | `cwnd += 1` once per `cwnd` new ACKs          |
//! | new ACK, RETRANSMISSION_TIMEOUT| back to SLOW_START, then as above             |
//! | full ACK (≥ high water), FR    | `cwnd = ssthresh`, to CA                      |
//! | partial ACK, FR                | `cwnd −= 1`, resend next unacked, stay in FR  |
//! | 3rd dup ACK, SS or CA          | fast retransmit, `ssthresh = max(cwnd/2, 1)`, |
//! |                                | `cwnd = ssthresh + 3`, to FR                  |
//! | further dup ACK, FR            | `cwnd += 1`                                   |
//! | timeout                        | `cwnd = 1`, RTO doubles, flight resent from   |
//! |                                | the lowest id, to RTO phase                   |
//!
//! One tick's expiries count as a single timeout, so the RTO doubles once
//! per tick at most and again only if the resent head expires too.
//!
//! `cwnd` limits what is *sent*, not what is already flying: right after a
//! fast retransmit the flight may exceed it.  Only windowed ARQ keeps
//! `flying ≤ cwnd` at all times.
//!
//! `ssthresh` is halved at most once per loss episode.  An episode starts at
//! the first loss signal and ends at the first new ACK outside FAST_RECOVERY.
//! The duplicate-ACK counter resets on every new ACK and on entering
//! FAST_RECOVERY.
//!
//! Channel NACKs are ignored: loss is inferred from ACKs and timers only.

use log::debug;

use crate::config::NewRenoConfig;
use crate::connection::{ConnectionState, Limits};
use crate::packet::{Packet, PacketId, PacketKind};
use crate::state::CongestionPhase;

const DUP_ACK_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct NewReno {
    base: ConnectionState,
    phase: CongestionPhase,
    cwnd: u32,
    /// `u32::MAX` until the first loss.
    ssthresh: u32,
    /// New ACKs counted towards the next CA increment.
    ca_acks: u32,
    last_ack: Option<PacketId>,
    dup_acks: u32,
    /// Highest id sent when fast recovery began.
    high_water: PacketId,
    in_loss_episode: bool,
    /// Retransmissions that go out this tick regardless of the window.
    urgent: Vec<PacketId>,
}

impl NewReno {
    pub fn new(config: &NewRenoConfig, backlog_capacity: Option<usize>) -> Self {
        let limits = Limits {
            timeout: config.timeout,
            max_attempts: config.max_attempts,
            max_retention: config.max_retention_ticks,
        };
        Self {
            base: ConnectionState::new("newreno", limits, backlog_capacity),
            phase: CongestionPhase::SlowStart,
            cwnd: config.initial_window.max(1),
            ssthresh: u32::MAX,
            ca_acks: 0,
            last_ack: None,
            dup_acks: 0,
            high_water: 0,
            in_loss_episode: false,
            urgent: Vec::new(),
        }
    }

    pub fn tick(&mut self, feedback: &[Packet]) -> Vec<Packet> {
        self.base.begin_tick();

        for pkt in feedback.iter().filter(|p| p.kind == PacketKind::Ack) {
            match self.last_ack {
                Some(last) if pkt.id == last => self.on_dup_ack(),
                Some(last) if pkt.id < last => {}
                _ => self.on_new_ack(pkt.id),
            }
        }

        if !self.base.sweep_timeouts().is_empty() {
            self.on_timeout();
        }
        self.base.abandon_over_limits();

        let mut out = Vec::new();
        for id in std::mem::take(&mut self.urgent) {
            out.extend(self.base.retransmit(id));
        }
        let mut slots = (self.cwnd as usize).saturating_sub(self.base.inflight().flying_count());
        for id in self.base.inflight().not_flying_ids() {
            if slots == 0 {
                break;
            }
            out.extend(self.base.retransmit(id));
            slots -= 1;
        }
        while slots > 0 {
            match self.base.send_new() {
                Some(pkt) => out.push(pkt),
                None => break,
            }
            slots -= 1;
        }
        out
    }

    fn on_new_ack(&mut self, id: PacketId) {
        self.base.acknowledge_through(id);
        self.last_ack = Some(id);
        self.dup_acks = 0;

        match self.phase {
            CongestionPhase::FastRecovery => {
                if id >= self.high_water {
                    self.cwnd = self.ssthresh;
                    self.enter(CongestionPhase::CongestionAvoidance);
                    self.in_loss_episode = false;
                } else {
                    self.cwnd = self.cwnd.saturating_sub(1).max(1);
                    if let Some(next) = self.base.inflight().lowest_id() {
                        self.urgent.push(next);
                    }
                }
            }
            CongestionPhase::RetransmissionTimeout => {
                self.in_loss_episode = false;
                self.enter(CongestionPhase::SlowStart);
                self.slow_start_ack();
            }
            CongestionPhase::SlowStart => {
                self.in_loss_episode = false;
                self.slow_start_ack();
            }
            CongestionPhase::CongestionAvoidance => {
                self.in_loss_episode = false;
                self.ca_acks += 1;
                if self.ca_acks >= self.cwnd {
                    self.cwnd += 1;
                    self.ca_acks = 0;
                }
            }
        }
    }

    fn slow_start_ack(&mut self) {
        self.cwnd += 1;
        if self.cwnd >= self.ssthresh {
            self.enter(CongestionPhase::CongestionAvoidance);
        }
    }

    fn on_dup_ack(&mut self) {
        self.dup_acks += 1;
        match self.phase {
            CongestionPhase::FastRecovery => self.cwnd += 1,
            CongestionPhase::SlowStart | CongestionPhase::CongestionAvoidance
                if self.dup_acks == DUP_ACK_THRESHOLD =>
            {
                self.fast_retransmit()
            }
            _ => {}
        }
    }

    fn fast_retransmit(&mut self) {
        let Some(last) = self.last_ack else {
            return;
        };
        self.ssthresh = (self.cwnd / 2).max(1);
        self.cwnd = self.ssthresh + 3;
        self.high_water = self.base.stats().highest_id.unwrap_or(last);
        self.in_loss_episode = true;
        self.dup_acks = 0;
        self.urgent.push(last + 1);
        debug!(
            "[newreno] 3 dup ACKs for {last}: fast retransmit {}, ssthresh={} cwnd={}",
            last + 1,
            self.ssthresh,
            self.cwnd
        );
        self.enter(CongestionPhase::FastRecovery);
    }

    fn on_timeout(&mut self) {
        if !self.in_loss_episode {
            self.ssthresh = (self.cwnd / 2).max(1);
            self.in_loss_episode = true;
        }
        self.cwnd = 1;
        self.dup_acks = 0;
        // The cumulative receiver dropped everything past the hole, so the
        // whole flight goes back to waiting and is resent lowest id first.
        for id in self.base.inflight().ids() {
            self.base.inflight_mut().mark_lost(id);
        }
        self.urgent.clear();
        self.base.rtt_mut().back_off();
        self.enter(CongestionPhase::RetransmissionTimeout);
    }

    fn enter(&mut self, phase: CongestionPhase) {
        if self.phase != phase {
            debug!("[newreno] {} → {} (cwnd={})", self.phase, phase, self.cwnd);
        }
        self.phase = phase;
        self.ca_acks = 0;
    }

    pub fn phase(&self) -> CongestionPhase {
        self.phase
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// `None` while still unbounded.
    pub fn ssthresh(&self) -> Option<u32> {
        (self.ssthresh != u32::MAX).then_some(self.ssthresh)
    }

    pub fn dup_acks(&self) -> u32 {
        self.dup_acks
    }

    pub fn base(&self) -> &ConnectionState {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut ConnectionState {
        &mut self.base
    }
}
