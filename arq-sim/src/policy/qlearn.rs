//! Tabular Q-learning over a discretized feature vector.
//!
//! Continuous features are bucketed (log2 for tick-valued features, tenths
//! for the loss rate) so the table stays small.  Transitions go into a
//! bounded replay memory; each [`DecisionPolicy::learn`] call replays a
//! random mini-batch once the memory holds at least `batch_size` entries,
//! then decays ε.

use std::collections::{HashMap, VecDeque};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Action, DecisionPolicy, FeatureVector};
use crate::config::QLearningConfig;

type StateKey = [u8; 5];

fn log2_bucket(x: f64) -> u8 {
    if x < 1.0 {
        0
    } else {
        (x.log2().floor() as u8).saturating_add(1).min(16)
    }
}

fn discretize(state: &FeatureVector) -> StateKey {
    [
        state.attempts.clamp(0.0, 15.0) as u8,
        log2_bucket(state.elapsed),
        log2_bucket(state.rtt),
        (state.loss_rate.clamp(0.0, 1.0) * 10.0).floor() as u8,
        log2_bucket(state.depth),
    ]
}

#[derive(Debug, Clone)]
struct Transition {
    state: StateKey,
    action: Action,
    reward: f64,
    next: StateKey,
}

#[derive(Debug)]
pub struct QLearning {
    config: QLearningConfig,
    table: HashMap<StateKey, [f64; 2]>,
    memory: VecDeque<Transition>,
    epsilon: f64,
    rng: StdRng,
    updates: u64,
}

impl QLearning {
    pub fn new(config: QLearningConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            epsilon: config.epsilon,
            memory: VecDeque::with_capacity(config.memory_capacity),
            table: HashMap::new(),
            rng,
            updates: 0,
            config,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Learned action values for `state`, indexed by [`Action::index`].
    pub fn q_values(&self, state: &FeatureVector) -> [f64; 2] {
        self.table.get(&discretize(state)).copied().unwrap_or_default()
    }

    fn greedy(&self, key: &StateKey) -> Action {
        let q = self.table.get(key).copied().unwrap_or_default();
        if q[Action::Abandon.index()] > q[Action::Retransmit.index()] {
            Action::Abandon
        } else {
            Action::Retransmit
        }
    }

    fn max_q(&self, key: &StateKey) -> f64 {
        let q = self.table.get(key).copied().unwrap_or_default();
        q[0].max(q[1])
    }
}

impl DecisionPolicy for QLearning {
    fn decide(&mut self, state: &FeatureVector) -> Action {
        if self.rng.random::<f64>() < self.epsilon {
            if self.rng.random_bool(0.5) {
                Action::Retransmit
            } else {
                Action::Abandon
            }
        } else {
            self.greedy(&discretize(state))
        }
    }

    fn observe(&mut self, prev: &FeatureVector, action: Action, reward: f64, next: &FeatureVector) {
        if self.memory.len() == self.config.memory_capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(Transition {
            state: discretize(prev),
            action,
            reward,
            next: discretize(next),
        });
    }

    fn learn(&mut self) {
        let len = self.memory.len();
        if len == 0 || len < self.config.batch_size {
            return;
        }
        for _ in 0..self.config.batch_size {
            let idx = self.rng.random_range(0..len);
            let t = self.memory[idx].clone();
            let target = t.reward + self.config.discount * self.max_q(&t.next);
            let q = self.table.entry(t.state).or_default();
            let a = t.action.index();
            q[a] += self.config.learning_rate * (target - q[a]);
        }
        self.updates += 1;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.min_epsilon);
        trace!(
            "[q-learning] update #{} eps={:.4} states={}",
            self.updates,
            self.epsilon,
            self.table.len()
        );
    }

    fn name(&self) -> &'static str {
        "q-learning"
    }
}
