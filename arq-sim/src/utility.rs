//! Delivery/delay utility used both as the adaptive protocol's reward and as
//! the per-tick score in reports.
//!
//! ```text
//!   utility(d, τ) = β1·fair(squash(d)) − β2·fair(squash(τ / delay_scale))
//!   squash(x)     = 2σ(x) − 1          ∈ (−1, 1)
//!   fair(x)       = sign(x)·|x|^α
//! ```

use crate::config::{Baseline, UtilityWeights};

fn squash(x: f64) -> f64 {
    2.0 / (1.0 + (-x).exp()) - 1.0
}

fn fair(x: f64, alpha: f64) -> f64 {
    x.signum() * x.abs().powf(alpha)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utility {
    weights: UtilityWeights,
    delay_scale: f64,
}

impl Utility {
    pub fn new(weights: UtilityWeights, delay_scale: f64) -> Self {
        Self {
            weights,
            delay_scale,
        }
    }

    /// Score a (delivery, delay) pair.  `delivery` is a rate in `[0, 1]`,
    /// `delay` is in ticks.
    pub fn score(&self, delivery: f64, delay: f64) -> f64 {
        let UtilityWeights { alpha, beta1, beta2 } = self.weights;
        beta1 * fair(squash(delivery), alpha) - beta2 * fair(squash(delay / self.delay_scale), alpha)
    }

    /// Reference value subtracted from rewards.
    pub fn baseline(&self, kind: Baseline, delivery_rate: f64, mean_delay: f64) -> f64 {
        match kind {
            Baseline::None => 0.0,
            Baseline::SystemAverage => self.score(delivery_rate, mean_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_utility() -> Utility {
        Utility::new(UtilityWeights::default(), 100.0)
    }

    #[test]
    fn nothing_delivered_nothing_waited_is_zero() {
        assert_eq!(default_utility().score(0.0, 0.0), 0.0);
    }

    #[test]
    fn delivery_helps_and_delay_hurts() {
        let u = default_utility();
        assert!(u.score(1.0, 0.0) > u.score(0.5, 0.0));
        assert!(u.score(1.0, 10.0) > u.score(1.0, 500.0));
    }

    #[test]
    fn squash_is_bounded_and_odd() {
        assert!(squash(1e6) <= 1.0);
        assert!(squash(-1e6) >= -1.0);
        assert!((squash(2.0) + squash(-2.0)).abs() < 1e-12);
    }

    #[test]
    fn fairness_exponent_keeps_sign() {
        assert_eq!(fair(-0.5, 2.0), -0.25);
        assert_eq!(fair(0.5, 1.0), 0.5);
    }

    #[test]
    fn baseline_none_is_zero() {
        let u = default_utility();
        assert_eq!(u.baseline(Baseline::None, 0.9, 20.0), 0.0);
        assert_eq!(
            u.baseline(Baseline::SystemAverage, 0.9, 20.0),
            u.score(0.9, 20.0)
        );
    }
}
