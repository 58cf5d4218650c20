//! `arq-sim`: a tick-driven simulator for reliable-delivery transport
//! protocols sharing one lossy, bandwidth-limited channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐ new DATA ┌──────────────┐  DATA   ┌─────────┐  DATA   ┌──────────┐
//!  │  Traffic  │─────────▶│  Connection  │────────▶│ Channel │────────▶│ Receiver │
//!  └───────────┘          │ (protocol +  │         └────┬────┘         └────┬─────┘
//!                         │  in-flight)  │◀─────────────┘ NACKs             │
//!                         └──────────────┘◀─────────────────────────────────┘
//!                                                  ACKs
//! ```
//!
//! Every component is a plain value advanced by [`simulator::Simulation`];
//! there is no I/O, no clock and no thread.
//!
//! Modules:
//! - [`packet`]: packet records
//! - [`inflight`]: per-packet send state, ordered by id
//! - [`rto`]: RTT estimation and retransmission timeout
//! - [`channel`]: bounded lossy FIFO with residency delay
//! - [`connection`]: shared send-side state and the protocol enum
//! - [`plain`]: fire-and-forget
//! - [`window_arq`]: windowed ARQ, selective or cumulative ACKs
//! - [`newreno`]: NewReno congestion control (phases in [`state`])
//! - [`adaptive`]: ARQ steered by a [`policy::DecisionPolicy`]
//! - [`utility`]: delivery/delay utility
//! - [`receiver`]: ACK generation and receive-side metrics
//! - [`traffic`]: periodic and Poisson sources
//! - [`simulator`]: the tick loop and reports
//! - [`config`]: JSON scenario configuration
//! - [`error`]: configuration errors

pub mod adaptive;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod inflight;
pub mod newreno;
pub mod packet;
pub mod plain;
pub mod policy;
pub mod receiver;
pub mod rto;
pub mod simulator;
pub mod state;
pub mod traffic;
pub mod utility;
pub mod window_arq;

pub use config::Scenario;
pub use connection::Connection;
pub use error::ConfigError;
pub use simulator::{Report, Simulation};
