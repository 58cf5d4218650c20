//! Selective-ACK ARQ that lets a [`DecisionPolicy`] choose between
//! retransmitting and abandoning each lost packet.
//!
//! The window only governs how many packets fly at once (`cwnd ≤ 0` means
//! no limit).  When a record is NACKed or times out it first goes through
//! the attempt/retention limits; only if it survives those is the policy
//! asked.  `Retransmit` leaves it waiting for a window slot, `Abandon`
//! removes it.
//!
//! Rewards:
//!
//! ```text
//!   acknowledged: utility(1, delay) − baseline
//!   abandoned:    utility(0, 0)     − baseline
//! ```
//!
//! The feature estimators follow the sender's own view of the path:
//! - loss rate over the last 100 outcomes (timeouts/NACKs count as losses);
//! - mean delay, EWMA with weight 0.01;
//! - delivery rate, EWMA with weight 0.001.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::config::{AdaptiveConfig, Baseline, Window};
use crate::connection::{ConnectionState, Limits};
use crate::inflight::InFlightRecord;
use crate::packet::{Packet, PacketId, PacketKind};
use crate::policy::{self, Action, DecisionPolicy, FeatureVector};
use crate::utility::Utility;

const LOSS_WINDOW: usize = 100;
const DELAY_WEIGHT: f64 = 0.01;
const DELIVERY_WEIGHT: f64 = 0.001;
const RETRANSMIT_WEIGHT: f64 = 0.01;

/// Fraction of the last [`LOSS_WINDOW`] outcomes that were losses.
#[derive(Debug, Default)]
struct LossWindow {
    outcomes: VecDeque<bool>,
    lost: usize,
}

impl LossWindow {
    fn push(&mut self, lost: bool) {
        if self.outcomes.len() == LOSS_WINDOW {
            if let Some(true) = self.outcomes.pop_front() {
                self.lost -= 1;
            }
        }
        self.outcomes.push_back(lost);
        if lost {
            self.lost += 1;
        }
    }

    fn estimate(&self) -> f64 {
        self.lost as f64 / LOSS_WINDOW as f64
    }
}

/// Running estimates the adaptive sender keeps about its path.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimates {
    pub loss_rate: f64,
    pub mean_delay: f64,
    pub delivery_rate: f64,
    /// EWMA of how often the policy chose to retransmit.
    pub retransmit_probability: f64,
}

#[derive(Debug)]
pub struct Adaptive {
    base: ConnectionState,
    cwnd: Window,
    policy: Box<dyn DecisionPolicy>,
    utility: Utility,
    baseline: Baseline,
    learn_retransmissions_only: bool,
    loss: LossWindow,
    mean_delay: f64,
    delivery_rate: f64,
    retransmit_probability: f64,
    decisions: u64,
    warned_giving_up: bool,
}

impl Adaptive {
    pub fn new(config: &AdaptiveConfig, backlog_capacity: Option<usize>) -> Self {
        Self::with_policy(config, backlog_capacity, policy::build(&config.policy))
    }

    pub fn with_policy(
        config: &AdaptiveConfig,
        backlog_capacity: Option<usize>,
        policy: Box<dyn DecisionPolicy>,
    ) -> Self {
        let limits = Limits {
            timeout: config.timeout,
            max_attempts: config.max_attempts,
            max_retention: config.max_retention_ticks,
        };
        Self {
            base: ConnectionState::new("adaptive", limits, backlog_capacity),
            cwnd: config.cwnd,
            policy,
            utility: Utility::new(config.utility_weights, config.delay_scale),
            baseline: config.baseline,
            learn_retransmissions_only: config.learn_retransmissions_only,
            loss: LossWindow::default(),
            mean_delay: 0.0,
            delivery_rate: 0.0,
            retransmit_probability: 0.0,
            decisions: 0,
            warned_giving_up: false,
        }
    }

    pub fn tick(&mut self, feedback: &[Packet]) -> Vec<Packet> {
        let now = self.base.begin_tick();

        let mut lost = Vec::new();
        for pkt in feedback {
            match pkt.kind {
                PacketKind::Ack => self.on_ack(pkt.id),
                PacketKind::Nack => {
                    if self.base.inflight_mut().mark_lost(pkt.id) {
                        lost.push(pkt.id);
                    }
                }
                PacketKind::Data => {}
            }
        }
        lost.extend(self.base.sweep_timeouts());
        lost.sort_unstable();
        lost.dedup();
        for _ in &lost {
            self.loss.push(true);
        }

        // Limits first: a record over its limits never reaches the policy.
        for id in self.base.inflight().not_flying_ids() {
            let over = self
                .base
                .inflight()
                .get(id)
                .is_some_and(|r| self.base.over_limits(r));
            if over {
                if let Some(record) = self.base.abandon(id) {
                    self.on_abandoned(&record);
                }
            }
        }

        for id in lost {
            let Some(record) = self.base.inflight().get(id) else {
                continue;
            };
            let state = self.features(record);
            let action = self.policy.decide(&state);
            debug!("[adaptive] id={id} {action:?} (attempts={})", state.attempts);
            self.decisions += 1;
            self.retransmit_probability = (1.0 - RETRANSMIT_WEIGHT) * self.retransmit_probability
                + RETRANSMIT_WEIGHT * f64::from(u8::from(action == Action::Retransmit));
            match action {
                Action::Retransmit => {
                    if let Some(record) = self.base.inflight_mut().get_mut(id) {
                        record.decision_state = Some(state);
                    }
                }
                Action::Abandon => {
                    if let Some(mut record) = self.base.abandon_by_policy(id) {
                        record.decision_state = Some(state);
                        self.on_abandoned(&record);
                    }
                }
            }
        }
        self.check_giving_up();

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
            let Some(pkt) = self.base.send_new() else {
                break;
            };
            let state = FeatureVector {
                attempts: 0.0,
                elapsed: now.saturating_sub(pkt.gen_time) as f64,
                ..self.path_features()
            };
            if let Some(record) = self.base.inflight_mut().get_mut(pkt.id) {
                record.decision_state = Some(state);
            }
            out.push(pkt);
            slots -= 1;
        }
        out
    }

    fn on_ack(&mut self, id: PacketId) {
        let Some(record) = self.base.acknowledge(id) else {
            return;
        };
        let delay = self.base.now().saturating_sub(record.gen_time) as f64;
        self.mean_delay = (1.0 - DELAY_WEIGHT) * self.mean_delay + DELAY_WEIGHT * delay;
        self.delivery_rate = (1.0 - DELIVERY_WEIGHT) * self.delivery_rate + DELIVERY_WEIGHT;
        self.loss.push(false);

        if record.attempts > 1 || !self.learn_retransmissions_only {
            let reward = self.utility.score(1.0, delay) - self.current_baseline();
            self.feed_back(&record, Action::Retransmit, reward);
        }
    }

    fn on_abandoned(&mut self, record: &InFlightRecord) {
        self.delivery_rate *= 1.0 - DELIVERY_WEIGHT;
        let reward = self.utility.score(0.0, 0.0) - self.current_baseline();
        self.feed_back(record, Action::Abandon, reward);
    }

    fn feed_back(&mut self, record: &InFlightRecord, action: Action, reward: f64) {
        let Some(prev) = record.decision_state else {
            return;
        };
        let next = self.features(record);
        self.policy.observe(&prev, action, reward, &next);
        self.policy.learn();
    }

    fn check_giving_up(&mut self) {
        if !self.warned_giving_up
            && self.decisions >= LOSS_WINDOW as u64
            && self.retransmit_probability < 0.01
        {
            warn!(
                "[adaptive] {} policy is abandoning nearly every loss (retransmit p={:.4})",
                self.policy.name(),
                self.retransmit_probability
            );
            self.warned_giving_up = true;
        }
    }

    fn current_baseline(&self) -> f64 {
        self.utility
            .baseline(self.baseline, self.delivery_rate, self.mean_delay)
    }

    /// Path-wide part of the feature vector.
    fn path_features(&self) -> FeatureVector {
        FeatureVector {
            attempts: 0.0,
            elapsed: 0.0,
            rtt: self.base.rtt().srtt().unwrap_or(0.0),
            loss_rate: self.loss.estimate(),
            depth: (self.base.backlog_len() + self.base.inflight().len()) as f64,
        }
    }

    fn features(&self, record: &InFlightRecord) -> FeatureVector {
        FeatureVector {
            attempts: f64::from(record.attempts),
            elapsed: self.base.now().saturating_sub(record.gen_time) as f64,
            ..self.path_features()
        }
    }

    pub fn estimates(&self) -> Estimates {
        Estimates {
            loss_rate: self.loss.estimate(),
            mean_delay: self.mean_delay,
            delivery_rate: self.delivery_rate,
            retransmit_probability: self.retransmit_probability,
        }
    }

    pub fn policy(&self) -> &dyn DecisionPolicy {
        self.policy.as_ref()
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
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::{Limit, UtilityWeights};
    use crate::policy::AlwaysRetransmit;

    type Log = Rc<RefCell<Vec<(Action, f64)>>>;

    /// Records every observation and answers with a fixed action.
    #[derive(Debug)]
    struct Scripted {
        answer: Action,
        log: Log,
    }

    impl DecisionPolicy for Scripted {
        fn decide(&mut self, _state: &FeatureVector) -> Action {
            self.answer
        }

        fn observe(&mut self, _: &FeatureVector, action: Action, reward: f64, _: &FeatureVector) {
            self.log.borrow_mut().push((action, reward));
        }

        fn learn(&mut self) {}

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn config(max_attempts: Limit) -> AdaptiveConfig {
        AdaptiveConfig {
            cwnd: Window::unbounded(),
            timeout: Limit::disabled(),
            max_attempts,
            baseline: Baseline::None,
            ..AdaptiveConfig::default()
        }
    }

    fn scripted(answer: Action, max_attempts: Limit) -> (Adaptive, Log) {
        let log = Log::default();
        let policy = Scripted {
            answer,
            log: Rc::clone(&log),
        };
        let p = Adaptive::with_policy(&config(max_attempts), None, Box::new(policy));
        (p, log)
    }

    fn load(p: &mut Adaptive, n: u64) {
        p.base_mut()
            .submit((0..n).map(|id| Packet::data(id, 1, 2, 0)).collect());
    }

    #[test]
    fn retransmit_decision_resends_lost_packet() {
        let mut p = Adaptive::with_policy(&config(Limit::disabled()), None, Box::new(AlwaysRetransmit));
        load(&mut p, 3);
        let sent = p.tick(&[]);
        let out = p.tick(&[sent[1].nack()]);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].id, out[0].attempt), (1, 2));
    }

    #[test]
    fn abandon_decision_removes_record_and_is_rewarded() {
        let (mut p, log) = scripted(Action::Abandon, Limit::disabled());
        load(&mut p, 2);
        let sent = p.tick(&[]);
        let out = p.tick(&[sent[0].nack()]);
        assert!(out.is_empty());
        assert!(!p.base().inflight().contains(0));
        assert_eq!(p.base().stats().abandoned_by_policy, 1);
        assert_eq!(*log.borrow(), vec![(Action::Abandon, 0.0)]);
    }

    #[test]
    fn limits_preempt_the_policy() {
        let (mut p, log) = scripted(Action::Retransmit, Limit::at(1));
        load(&mut p, 6);
        let sent = p.tick(&[]);
        let out = p.tick(&[sent[5].nack()]);
        assert!(out.is_empty());
        assert_eq!(p.base().stats().abandoned, 1);
        assert_eq!(p.base().stats().abandoned_by_policy, 0);
        assert_eq!(log.borrow().len(), 1);
        assert!(!p.base().inflight().contains(5));
    }

    #[test]
    fn ack_reward_is_utility_of_delay() {
        let (mut p, log) = scripted(Action::Retransmit, Limit::disabled());
        load(&mut p, 1);
        let sent = p.tick(&[]);
        p.tick(&[]);
        p.tick(&[sent[0].ack(0)]);
        let expected = Utility::new(UtilityWeights::default(), 100.0).score(1.0, 3.0);
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, Action::Retransmit);
        assert!((log[0].1 - expected).abs() < 1e-12);
    }

    #[test]
    fn learning_can_skip_first_try_successes() {
        let log = Log::default();
        let policy = Scripted {
            answer: Action::Retransmit,
            log: Rc::clone(&log),
        };
        let cfg = AdaptiveConfig {
            learn_retransmissions_only: true,
            ..config(Limit::disabled())
        };
        let mut p = Adaptive::with_policy(&cfg, None, Box::new(policy));
        load(&mut p, 2);
        let sent = p.tick(&[]);
        let again = p.tick(&[sent[1].nack()]);
        p.tick(&[sent[0].ack(0), again[0].ack(1)]);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn loss_window_forgets_old_outcomes() {
        let mut w = LossWindow::default();
        for _ in 0..LOSS_WINDOW {
            w.push(true);
        }
        assert_eq!(w.estimate(), 1.0);
        for _ in 0..LOSS_WINDOW / 2 {
            w.push(false);
        }
        assert_eq!(w.estimate(), 0.5);
    }
}
