//! Round-trip-time estimation and retransmission timeout, measured in ticks.
//!
//! Every acknowledged record yields one RTT sample (`now − last_send_time`).
//! The estimator keeps the usual smoothed pair:
//!
//! ```text
//!   first sample:  SRTT = R            RTTVAR = R / 2
//!   afterwards:    RTTVAR = 3/4·RTTVAR + 1/4·|RTTVAR − R|
//!                  SRTT   = 7/8·SRTT   + 1/8·R
//!   RTO = SRTT + max(1, 4·RTTVAR)        (capped at MAX_RTO)
//! ```
//!
//! The variance term tracks the distance between the previous variance and
//! the sample, not between SRTT and the sample.  With non-negative samples
//! RTTVAR can therefore never go negative.
//!
//! A disabled timeout (`-1` in configuration) turns the whole RTO side off:
//! samples still refine SRTT, which features and reports read, but nothing
//! ever times out.

use crate::config::Limit;
use crate::packet::Tick;

/// Upper bound for the RTO after repeated back-off.
pub const MAX_RTO: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT; `None` until the first sample.
    srtt: Option<f64>,
    rttvar: f64,
    /// Current timeout, or `None` when timeout tracking is disabled.
    rto: Option<f64>,
    samples: u64,
}

impl RttEstimator {
    /// `timeout` is the initial RTO.
    pub fn new(timeout: Limit) -> Self {
        Self {
            srtt: None,
            rttvar: 0.0,
            rto: timeout.get().map(|t| (t as f64).min(MAX_RTO)),
            samples: 0,
        }
    }

    pub fn record_sample(&mut self, sample: f64) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = sample / 2.0;
            }
            Some(srtt) => {
                self.rttvar = 0.75 * self.rttvar + 0.25 * (self.rttvar - sample).abs();
                self.srtt = Some(0.875 * srtt + 0.125 * sample);
            }
        }
        self.samples += 1;
        if self.rto.is_some() {
            let srtt = self.srtt.unwrap_or(sample);
            self.rto = Some((srtt + (4.0 * self.rttvar).max(1.0)).min(MAX_RTO));
        }
    }

    /// Double the RTO (exponential back-off), capped at [`MAX_RTO`].
    pub fn back_off(&mut self) {
        if let Some(rto) = self.rto.as_mut() {
            *rto = (*rto * 2.0).min(MAX_RTO);
        }
    }

    /// `true` iff timeout tracking is enabled and `now − last_send > RTO`.
    pub fn is_timed_out(&self, now: Tick, last_send: Tick) -> bool {
        match self.rto {
            Some(rto) => now.saturating_sub(last_send) as f64 > rto,
            None => false,
        }
    }

    pub fn srtt(&self) -> Option<f64> {
        self.srtt
    }

    pub fn rttvar(&self) -> f64 {
        self.rttvar
    }

    pub fn rto(&self) -> Option<f64> {
        self.rto
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
