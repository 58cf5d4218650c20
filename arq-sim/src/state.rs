//! Congestion-control phases of the NewReno sender.
//!
//! Transitions are driven from [`crate::newreno`]; this module only names
//! the states.
//!
//! ```text
//!                  cwnd ≥ ssthresh
//!   SLOW_START ───────────────────▶ CONGESTION_AVOIDANCE
//!      ▲    │ 3 dup ACKs                 │ 3 dup ACKs
//!      │    └──────────┐    ┌────────────┘
//!      │               ▼    ▼
//!      │           FAST_RECOVERY ──full ACK──▶ CONGESTION_AVOIDANCE
//!      │ new ACK
//!   RETRANSMISSION_TIMEOUT ◀──── timeout (from any phase)
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CongestionPhase {
    /// Window grows by one segment per new ACK.
    #[default]
    SlowStart,
    /// Window grows by one segment per window's worth of new ACKs.
    CongestionAvoidance,
    /// Waiting for the first new ACK after an RTO expired.
    RetransmissionTimeout,
    /// Recovering from a triple duplicate ACK until `high_water` is acked.
    FastRecovery,
}

impl std::fmt::Display for CongestionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CongestionPhase::SlowStart => "SLOW_START",
            CongestionPhase::CongestionAvoidance => "CONGESTION_AVOIDANCE",
            CongestionPhase::RetransmissionTimeout => "RETRANSMISSION_TIMEOUT",
            CongestionPhase::FastRecovery => "FAST_RECOVERY",
        };
        f.write_str(name)
    }
}
