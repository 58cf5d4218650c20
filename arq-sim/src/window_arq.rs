//! Windowed ARQ with a selectable acknowledgement discipline.
//!
//! [`WindowArq`] keeps at most `cwnd` packets flying.  Lost packets (NACKed
//! or timed out) stay in the in-flight table, not flying, until a window slot
//! frees up for their retransmission or a limit abandons them.
//!
//! # Per-packet states
//!
//! ```text
//!  UNSENT ──send──▶ FLYING ──ACK──▶ (removed)
//!                     │  ▲
//!         NACK/timeout│  │retransmit
//!                     ▼  │
//!                   WAITING ──limit──▶ (abandoned)
//! ```
//!
//! # Tick order
//!
//! 1. ACKs.  Selective removes the matching record; cumulative removes every
//!    record up to and including the ACK id.
//! 2. NACKs mark the matching flying record as waiting.
//! 3. Timeout sweep.
//! 4. Waiting records over their attempt/retention limits are abandoned.
//! 5. Free window slots go to waiting records (lowest id first), then to
//!    new backlog packets.

use crate::config::{AckDiscipline, Window, WindowArqConfig};
use crate::connection::{ConnectionState, Limits};
use crate::packet::{Packet, PacketKind};

#[derive(Debug)]
pub struct WindowArq {
    base: ConnectionState,
    cwnd: Window,
    discipline: AckDiscipline,
}

impl WindowArq {
    pub fn new(config: &WindowArqConfig, backlog_capacity: Option<usize>) -> Self {
        let limits = Limits {
            timeout: config.timeout,
            max_attempts: config.max_attempts,
            max_retention: config.max_retention_ticks,
        };
        Self {
            base: ConnectionState::new("arq", limits, backlog_capacity),
            cwnd: config.cwnd,
            discipline: config.ack_discipline,
        }
    }

    pub fn tick(&mut self, feedback: &[Packet]) -> Vec<Packet> {
        self.base.begin_tick();

        for pkt in feedback {
            match pkt.kind {
                PacketKind::Ack => match self.discipline {
                    AckDiscipline::Selective => {
                        self.base.acknowledge(pkt.id);
                    }
                    AckDiscipline::Cumulative => {
                        self.base.acknowledge_through(pkt.id);
                    }
                },
                PacketKind::Nack => {
                    self.base.inflight_mut().mark_lost(pkt.id);
                }
                PacketKind::Data => {}
            }
        }

        self.base.sweep_timeouts();
        self.base.abandon_over_limits();

        let mut slots = self.cwnd.available(self.base.inflight().flying_count());
        let mut out = Vec::new();
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

    pub fn cwnd(&self) -> Window {
        self.cwnd
    }

    pub fn discipline(&self) -> AckDiscipline {
        self.discipline
    }

    pub fn base(&self) -> &ConnectionState {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut ConnectionState {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limit;

    fn arq(cwnd: i64, discipline: AckDiscipline, timeout: Limit) -> WindowArq {
        WindowArq::new(
            &WindowArqConfig {
                cwnd: Window::from(cwnd),
                ack_discipline: discipline,
                timeout,
                max_attempts: Limit::disabled(),
                max_retention_ticks: Limit::disabled(),
            },
            None,
        )
    }

    fn load(p: &mut WindowArq, n: u64) {
        p.base_mut()
            .submit((0..n).map(|id| Packet::data(id, 1, 2, 0)).collect());
    }

    fn ids(pkts: &[Packet]) -> Vec<u64> {
        pkts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn window_limits_first_burst() {
        let mut p = arq(3, AckDiscipline::Selective, Limit::disabled());
        load(&mut p, 10);
        assert_eq!(ids(&p.tick(&[])), vec![0, 1, 2]);
        assert!(p.tick(&[]).is_empty());
    }

    #[test]
    fn unbounded_window_drains_backlog() {
        let mut p = arq(0, AckDiscipline::Selective, Limit::disabled());
        load(&mut p, 10);
        assert_eq!(p.tick(&[]).len(), 10);
    }

    #[test]
    fn nack_frees_slot_for_retransmission_first() {
        let mut p = arq(2, AckDiscipline::Selective, Limit::disabled());
        load(&mut p, 4);
        let sent = p.tick(&[]);
        let out = p.tick(&[sent[1].nack()]);
        assert_eq!(ids(&out), vec![1]);
        assert_eq!(out[0].attempt, 2);
    }

    #[test]
    fn cumulative_ack_clears_prefix() {
        let mut p = arq(5, AckDiscipline::Cumulative, Limit::disabled());
        load(&mut p, 5);
        let sent = p.tick(&[]);
        let out = p.tick(&[sent[3].ack(3)]);
        assert_eq!(p.base().inflight().ids(), vec![4]);
        assert_eq!(p.base().stats().delivered, 4);
        assert!(out.is_empty());
    }

    #[test]
    fn timeout_triggers_retransmission() {
        let mut p = arq(1, AckDiscipline::Selective, Limit::at(2));
        load(&mut p, 2);
        assert_eq!(ids(&p.tick(&[])), vec![0]);
        assert!(p.tick(&[]).is_empty());
        assert!(p.tick(&[]).is_empty());
        let out = p.tick(&[]);
        assert_eq!(ids(&out), vec![0]);
        assert_eq!(out[0].attempt, 2);
    }

    #[test]
    fn nack_for_unknown_id_is_ignored() {
        let mut p = arq(2, AckDiscipline::Selective, Limit::disabled());
        load(&mut p, 2);
        p.tick(&[]);
        let ghost = Packet::data(99, 1, 2, 0).nack();
        assert!(p.tick(&[ghost]).is_empty());
        assert_eq!(p.base().inflight().flying_count(), 2);
    }
}
