//! Fire-and-forget delivery: everything in the backlog goes out the tick it
//! is seen, nothing is tracked, and feedback is ignored.

use crate::config::PlainConfig;
use crate::connection::{ConnectionState, Limits};
use crate::packet::Packet;

#[derive(Debug)]
pub struct Plain {
    base: ConnectionState,
}

impl Plain {
    pub fn new(_config: &PlainConfig, backlog_capacity: Option<usize>) -> Self {
        Self {
            base: ConnectionState::new("plain", Limits::default(), backlog_capacity),
        }
    }

    pub fn tick(&mut self, _feedback: &[Packet]) -> Vec<Packet> {
        self.base.begin_tick();
        self.base.send_untracked()
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

    #[test]
    fn sends_everything_and_keeps_nothing() {
        let mut p = Plain::new(&PlainConfig::default(), None);
        p.base_mut()
            .submit((0..5).map(|id| Packet::data(id, 1, 2, 0)).collect());
        let nack = Packet::data(0, 1, 2, 0).nack();
        let out = p.tick(&[nack]);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|pkt| pkt.send_time == 1 && pkt.attempt == 1));
        assert!(p.base().inflight().is_empty());
        assert!(p.tick(&[]).is_empty());
        assert_eq!(p.base().stats().new_sent, 5);
    }
}
