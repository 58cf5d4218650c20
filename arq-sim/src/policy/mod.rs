//! Retry-or-give-up decisions for the adaptive protocol.
//!
//! A [`DecisionPolicy`] is consulted exactly when an in-flight packet has
//! been NACKed or has timed out and the protocol must choose between sending
//! it again and abandoning it.  It never decides whether to send new data.
//!
//! The protocol feeds back every resolved decision through
//! [`DecisionPolicy::observe`] and then calls [`DecisionPolicy::learn`];
//! policies that do not learn ignore both.

mod qlearn;

pub use qlearn::QLearning;

use crate::config::PolicyConfig;

/// What the policy sees at a decision point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureVector {
    /// Transmissions so far.
    pub attempts: f64,
    /// Ticks since the packet was generated.
    pub elapsed: f64,
    /// Smoothed RTT estimate in ticks.
    pub rtt: f64,
    /// Recent loss-rate estimate in `[0, 1]`.
    pub loss_rate: f64,
    /// Packets queued or outstanding at the sender.
    pub depth: f64,
}

impl FeatureVector {
    pub fn to_array(self) -> [f64; 5] {
        [self.attempts, self.elapsed, self.rtt, self.loss_rate, self.depth]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Abandon,
    Retransmit,
}

impl Action {
    pub const ALL: [Action; 2] = [Action::Abandon, Action::Retransmit];

    pub fn index(self) -> usize {
        match self {
            Action::Abandon => 0,
            Action::Retransmit => 1,
        }
    }
}

pub trait DecisionPolicy: std::fmt::Debug {
    fn decide(&mut self, state: &FeatureVector) -> Action;

    /// Report the outcome of an earlier decision: `prev` was the state the
    /// action was taken in, `next` the state when the outcome became known.
    fn observe(&mut self, prev: &FeatureVector, action: Action, reward: f64, next: &FeatureVector);

    fn learn(&mut self);

    fn name(&self) -> &'static str;
}

/// Deterministic policy that never gives up.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetransmit;

impl DecisionPolicy for AlwaysRetransmit {
    fn decide(&mut self, _state: &FeatureVector) -> Action {
        Action::Retransmit
    }

    fn observe(&mut self, _: &FeatureVector, _: Action, _: f64, _: &FeatureVector) {}

    fn learn(&mut self) {}

    fn name(&self) -> &'static str {
        "always-retransmit"
    }
}

pub fn build(config: &PolicyConfig) -> Box<dyn DecisionPolicy> {
    match config {
        PolicyConfig::AlwaysRetransmit(_) => Box::new(AlwaysRetransmit),
        PolicyConfig::QLearning(cfg) => Box::new(QLearning::new(cfg.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_retransmit_ignores_everything() {
        let mut p = AlwaysRetransmit;
        let s = FeatureVector {
            attempts: 50.0,
            loss_rate: 1.0,
            ..FeatureVector::default()
        };
        p.observe(&s, Action::Retransmit, -100.0, &s);
        p.learn();
        assert_eq!(p.decide(&s), Action::Retransmit);
    }

    #[test]
    fn builds_from_config() {
        assert_eq!(build(&PolicyConfig::AlwaysRetransmit(Default::default())).name(), "always-retransmit");
        assert_eq!(build(&PolicyConfig::default()).name(), "q-learning");
    }
}
