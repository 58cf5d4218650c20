//! Configuration surface.
//!
//! Everything a run needs is described by plain structs that deserialize from
//! JSON with camelCase keys.  Unknown keys are rejected, required keys have no
//! `#[serde(default)]`, and integer options that use `-1` to mean "disabled"
//! decode into [`Limit`] / [`Window`] so the rest of the crate never sees a
//! sentinel.
//!
//! Each struct is owned by the component built from it; nothing here is shared
//! or global.
//!
//! ```json
//! {
//!   "ticks": 20000,
//!   "channel": { "throughput": 3, "capacity": 50, "dropProbability": 0.01 },
//!   "flows": [{
//!     "client": 1, "server": 11,
//!     "traffic": { "mode": "periodic", "period": 4, "pktsPerPeriod": 3 },
//!     "protocol": { "protocol": "windowArq", "cwnd": 4, "ackDiscipline": "cumulative" }
//!   }]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::packet::HostId;

// ---------------------------------------------------------------------------
// Sentinel-backed integers
// ---------------------------------------------------------------------------

/// A non-negative threshold that can be switched off.
///
/// Decodes from a signed integer; any negative value (conventionally `-1`)
/// disables the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Limit(Option<u64>);

impl Limit {
    pub const fn disabled() -> Self {
        Self(None)
    }

    pub const fn at(value: u64) -> Self {
        Self(Some(value))
    }

    pub fn get(self) -> Option<u64> {
        self.0
    }

    pub fn is_enabled(self) -> bool {
        self.0.is_some()
    }

    /// `true` when the limit is enabled and `value` has reached it.
    pub fn reached_by(self, value: u64) -> bool {
        self.0.is_some_and(|limit| value >= limit)
    }
}

impl From<i64> for Limit {
    fn from(v: i64) -> Self {
        if v < 0 {
            Self(None)
        } else {
            Self(Some(v as u64))
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        limit.0.map_or(-1, |v| v.min(i64::MAX as u64) as i64)
    }
}

/// Congestion window size in packets.  `cwnd <= 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Window(Option<u32>);

impl Window {
    pub const fn unbounded() -> Self {
        Self(None)
    }

    pub const fn of(size: u32) -> Self {
        Self(Some(size))
    }

    pub fn get(self) -> Option<u32> {
        self.0
    }

    /// Free slots given the number of packets currently flying.
    pub fn available(self, flying: usize) -> usize {
        match self.0 {
            Some(size) => (size as usize).saturating_sub(flying),
            None => usize::MAX,
        }
    }
}

impl From<i64> for Window {
    fn from(v: i64) -> Self {
        if v <= 0 {
            Self(None)
        } else {
            Self(Some(v.min(u32::MAX as i64) as u32))
        }
    }
}

impl From<Window> for i64 {
    fn from(w: Window) -> Self {
        w.0.map_or(0, i64::from)
    }
}

// ---------------------------------------------------------------------------
// Protocol configuration
// ---------------------------------------------------------------------------

/// How a receiver acknowledges data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckDiscipline {
    /// ACK carries the largest in-order id received so far.
    #[serde(alias = "LC")]
    Cumulative,
    /// ACK carries exactly the id that arrived.
    #[serde(alias = "SACK")]
    Selective,
}

impl std::fmt::Display for AckDiscipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckDiscipline::Cumulative => f.write_str("cumulative"),
            AckDiscipline::Selective => f.write_str("selective"),
        }
    }
}

fn default_timeout() -> Limit {
    Limit::at(30)
}

fn default_initial_window() -> u32 {
    4
}

fn default_delay_scale() -> f64 {
    100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlainConfig {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WindowArqConfig {
    pub cwnd: Window,
    pub ack_discipline: AckDiscipline,
    /// Initial RTO in ticks; `-1` disables timeout-driven retransmission.
    #[serde(default = "default_timeout")]
    pub timeout: Limit,
    #[serde(default)]
    pub max_attempts: Limit,
    #[serde(default)]
    pub max_retention_ticks: Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRenoConfig {
    #[serde(default = "default_initial_window")]
    pub initial_window: u32,
    #[serde(default = "default_timeout")]
    pub timeout: Limit,
    #[serde(default)]
    pub max_attempts: Limit,
    #[serde(default)]
    pub max_retention_ticks: Limit,
}

impl Default for NewRenoConfig {
    fn default() -> Self {
        Self {
            initial_window: default_initial_window(),
            timeout: default_timeout(),
            max_attempts: Limit::disabled(),
            max_retention_ticks: Limit::disabled(),
        }
    }
}

/// Weights of the delivery/delay utility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UtilityWeights {
    /// Fairness exponent applied to each squashed term (1 = linear).
    pub alpha: f64,
    /// Emphasis on delivery.
    pub beta1: f64,
    /// Emphasis on delay.
    pub beta2: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta1: 0.9,
            beta2: 0.1,
        }
    }
}

/// What the learned policy's reward is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Baseline {
    /// Raw utility.
    None,
    /// Utility minus the utility of the running delivery-rate and delay
    /// estimates.
    #[default]
    SystemAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    pub discount: f64,
    /// Exploration probability at start.
    pub epsilon: f64,
    /// Multiplied into `epsilon` after every learning step.
    pub epsilon_decay: f64,
    pub min_epsilon: f64,
    pub batch_size: usize,
    pub memory_capacity: usize,
    pub seed: Option<u64>,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            epsilon: 0.3,
            epsilon_decay: 0.999,
            min_epsilon: 0.01,
            batch_size: 16,
            memory_capacity: 4096,
            seed: None,
        }
    }
}

/// `alwaysRetransmit` takes no options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlwaysRetransmitConfig {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PolicyConfig {
    AlwaysRetransmit(AlwaysRetransmitConfig),
    QLearning(QLearningConfig),
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::QLearning(QLearningConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AdaptiveConfig {
    #[serde(default)]
    pub cwnd: Window,
    #[serde(default = "default_timeout")]
    pub timeout: Limit,
    #[serde(default)]
    pub max_attempts: Limit,
    #[serde(default)]
    pub max_retention_ticks: Limit,
    #[serde(default)]
    pub utility_weights: UtilityWeights,
    /// Delay (ticks) that maps to the middle of the squash range.
    #[serde(default = "default_delay_scale")]
    pub delay_scale: f64,
    #[serde(default)]
    pub baseline: Baseline,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Only packets that needed at least one retransmission feed the policy.
    #[serde(default)]
    pub learn_retransmissions_only: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            cwnd: Window::unbounded(),
            timeout: default_timeout(),
            max_attempts: Limit::disabled(),
            max_retention_ticks: Limit::disabled(),
            utility_weights: UtilityWeights::default(),
            delay_scale: default_delay_scale(),
            baseline: Baseline::default(),
            policy: PolicyConfig::default(),
            learn_retransmissions_only: false,
        }
    }
}

/// Protocol selection plus its options, tagged by `"protocol"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "camelCase")]
pub enum ProtocolConfig {
    Plain(PlainConfig),
    WindowArq(WindowArqConfig),
    NewReno(NewRenoConfig),
    Adaptive(AdaptiveConfig),
}

impl ProtocolConfig {
    /// The acknowledgement discipline the peer receiver must run, or `None`
    /// when the protocol never reads ACKs.
    pub fn ack_discipline(&self) -> Option<AckDiscipline> {
        match self {
            ProtocolConfig::Plain(_) => None,
            ProtocolConfig::WindowArq(c) => Some(c.ack_discipline),
            ProtocolConfig::NewReno(_) => Some(AckDiscipline::Cumulative),
            ProtocolConfig::Adaptive(_) => Some(AckDiscipline::Selective),
        }
    }

    /// Short human-readable name used in reports.
    pub fn label(&self) -> String {
        match self {
            ProtocolConfig::Plain(_) => "plain".to_string(),
            ProtocolConfig::WindowArq(c) => match c.cwnd.get() {
                Some(w) => format!("arq(w={w},{})", c.ack_discipline),
                None => format!("arq(w=inf,{})", c.ack_discipline),
            },
            ProtocolConfig::NewReno(_) => "newreno".to_string(),
            ProtocolConfig::Adaptive(c) => match c.policy {
                PolicyConfig::AlwaysRetransmit(_) => "adaptive(always)".to_string(),
                PolicyConfig::QLearning(_) => "adaptive(q)".to_string(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ProtocolConfig::Plain(_) | ProtocolConfig::WindowArq(_) => Ok(()),
            ProtocolConfig::NewReno(c) => {
                if c.initial_window == 0 {
                    return Err(ConfigError::invalid("initialWindow", "must be at least 1"));
                }
                Ok(())
            }
            ProtocolConfig::Adaptive(c) => {
                validate_weights(&c.utility_weights)?;
                if !(c.delay_scale.is_finite() && c.delay_scale > 0.0) {
                    return Err(ConfigError::invalid("delayScale", "must be a positive number"));
                }
                if let PolicyConfig::QLearning(q) = &c.policy {
                    validate_q_learning(q)?;
                }
                Ok(())
            }
        }
    }
}

fn validate_weights(w: &UtilityWeights) -> Result<(), ConfigError> {
    if !(w.alpha.is_finite() && w.alpha > 0.0) {
        return Err(ConfigError::invalid("alpha", "must be a positive number"));
    }
    if !w.beta1.is_finite() || !w.beta2.is_finite() {
        return Err(ConfigError::invalid("utilityWeights", "weights must be finite"));
    }
    Ok(())
}

fn validate_q_learning(q: &QLearningConfig) -> Result<(), ConfigError> {
    let unit = |v: f64| (0.0..=1.0).contains(&v);
    if !unit(q.learning_rate) {
        return Err(ConfigError::invalid("learningRate", "must lie in [0, 1]"));
    }
    if !unit(q.discount) {
        return Err(ConfigError::invalid("discount", "must lie in [0, 1]"));
    }
    if !unit(q.epsilon) || !unit(q.min_epsilon) || !unit(q.epsilon_decay) {
        return Err(ConfigError::invalid("epsilon", "exploration rates must lie in [0, 1]"));
    }
    if q.batch_size == 0 {
        return Err(ConfigError::invalid("batchSize", "must be at least 1"));
    }
    if q.memory_capacity < q.batch_size {
        return Err(ConfigError::invalid(
            "memoryCapacity",
            "must be at least batchSize",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Channel configuration
// ---------------------------------------------------------------------------

fn default_throughput() -> i64 {
    1
}

fn default_min_delay() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelConfig {
    /// Maximum packets the channel releases per tick.  Must be positive.
    #[serde(default = "default_throughput")]
    pub throughput: i64,
    /// Queue capacity in packets; `0` is unbounded, negative is rejected.
    #[serde(default)]
    pub capacity: i64,
    /// Probability that an admitted packet is lost outright.
    #[serde(default)]
    pub drop_probability: f64,
    /// Minimum ticks a packet spends in the queue.
    #[serde(default = "default_min_delay")]
    pub min_delay: u64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            throughput: default_throughput(),
            capacity: 0,
            drop_probability: 0.0,
            min_delay: default_min_delay(),
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traffic configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PeriodicTraffic {
    pub period: u64,
    pub pkts_per_period: u32,
    #[serde(default)]
    pub start_time: u64,
    /// How long after `start_time` traffic keeps flowing; `-1` is forever.
    #[serde(default)]
    pub last_time: Limit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PoissonTraffic {
    pub lambda: f64,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub last_time: Limit,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TrafficConfig {
    Periodic(PeriodicTraffic),
    Poisson(PoissonTraffic),
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// One client → server pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub client: HostId,
    pub server: HostId,
    pub traffic: TrafficConfig,
    pub protocol: ProtocolConfig,
    /// Transmit backlog bound; absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_capacity: Option<usize>,
}

impl FlowConfig {
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.protocol.label())
    }
}

fn default_ticks() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Seeds the connection-order shuffle.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub channel: ChannelConfig,
    pub flows: Vec<FlowConfig>,
    /// Weights used to score every flow in the final report.
    #[serde(default)]
    pub utility_weights: UtilityWeights,
    #[serde(default = "default_delay_scale")]
    pub delay_scale: f64,
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let scenario: Scenario = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks that serde cannot express.  Component-level range
    /// checks run again when each component is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flows.is_empty() {
            return Err(ConfigError::invalid("flows", "at least one flow is required"));
        }
        let mut hosts = std::collections::HashSet::new();
        for flow in &self.flows {
            if flow.client == flow.server {
                return Err(ConfigError::invalid(
                    "flows",
                    format!("client and server must differ (host {})", flow.client),
                ));
            }
            for host in [flow.client, flow.server] {
                if !hosts.insert(host) {
                    return Err(ConfigError::invalid(
                        "flows",
                        format!("host {host} appears in more than one flow"),
                    ));
                }
            }
            flow.protocol.validate()?;
        }
        validate_weights(&self.utility_weights)?;
        if !(self.delay_scale.is_finite() && self.delay_scale > 0.0) {
            return Err(ConfigError::invalid("delayScale", "must be a positive number"));
        }
        Ok(())
    }

    /// A small scenario comparing every protocol on one shared channel.
    pub fn example() -> Self {
        let traffic = || {
            TrafficConfig::Periodic(PeriodicTraffic {
                period: 4,
                pkts_per_period: 3,
                start_time: 0,
                last_time: Limit::disabled(),
            })
        };
        let flow = |client, server, protocol| FlowConfig {
            name: None,
            client,
            server,
            traffic: traffic(),
            protocol,
            backlog_capacity: None,
        };
        Scenario {
            ticks: 20_000,
            seed: None,
            channel: ChannelConfig {
                throughput: 3,
                capacity: 50,
                drop_probability: 0.01,
                min_delay: 1,
                seed: None,
            },
            flows: vec![
                flow(101, 111, ProtocolConfig::Adaptive(AdaptiveConfig {
                    max_attempts: Limit::at(10),
                    max_retention_ticks: Limit::at(1000),
                    ..AdaptiveConfig::default()
                })),
                flow(201, 211, ProtocolConfig::WindowArq(WindowArqConfig {
                    cwnd: Window::of(4),
                    ack_discipline: AckDiscipline::Cumulative,
                    timeout: default_timeout(),
                    max_attempts: Limit::disabled(),
                    max_retention_ticks: Limit::disabled(),
                })),
                flow(301, 311, ProtocolConfig::Plain(PlainConfig {})),
                flow(401, 411, ProtocolConfig::NewReno(NewRenoConfig::default())),
            ],
            utility_weights: UtilityWeights::default(),
            delay_scale: default_delay_scale(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_limit_disables() {
        let limit: Limit = serde_json::from_str("-1").unwrap();
        assert_eq!(limit, Limit::disabled());
        assert!(!limit.reached_by(u64::MAX));

        let limit: Limit = serde_json::from_str("3").unwrap();
        assert!(!limit.reached_by(2));
        assert!(limit.reached_by(3));
    }

    #[test]
    fn non_positive_cwnd_is_unbounded() {
        let w: Window = serde_json::from_str("0").unwrap();
        assert_eq!(w.available(1_000), usize::MAX);
        let w: Window = serde_json::from_str("2").unwrap();
        assert_eq!(w.available(1), 1);
        assert_eq!(w.available(5), 0);
    }

    #[test]
    fn window_arq_requires_cwnd_and_discipline() {
        let missing = r#"{ "protocol": "windowArq", "cwnd": 4 }"#;
        assert!(serde_json::from_str::<ProtocolConfig>(missing).is_err());

        let ok = r#"{ "protocol": "windowArq", "cwnd": 4, "ackDiscipline": "SACK" }"#;
        let cfg: ProtocolConfig = serde_json::from_str(ok).unwrap();
        match cfg {
            ProtocolConfig::WindowArq(c) => {
                assert_eq!(c.ack_discipline, AckDiscipline::Selective);
                assert_eq!(c.timeout, Limit::at(30));
                assert_eq!(c.max_attempts, Limit::disabled());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let text = r#"{ "protocol": "newReno", "initialWindow": 2, "bogus": 1 }"#;
        assert!(serde_json::from_str::<ProtocolConfig>(text).is_err());
    }

    #[test]
    fn zero_initial_window_fails_validation() {
        let cfg = ProtocolConfig::NewReno(NewRenoConfig {
            initial_window: 0,
            ..NewRenoConfig::default()
        });
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "initialWindow", .. })
        ));
    }

    #[test]
    fn adaptive_defaults_fill_in() {
        let cfg: ProtocolConfig = serde_json::from_str(r#"{ "protocol": "adaptive" }"#).unwrap();
        assert_eq!(cfg, ProtocolConfig::Adaptive(AdaptiveConfig::default()));
        assert_eq!(cfg.ack_discipline(), Some(AckDiscipline::Selective));
    }

    #[test]
    fn policy_is_tagged_by_kind() {
        let text = r#"{ "protocol": "adaptive", "policy": { "kind": "alwaysRetransmit" } }"#;
        let cfg: ProtocolConfig = serde_json::from_str(text).unwrap();
        assert_eq!(cfg.label(), "adaptive(always)");
    }

    #[test]
    fn always_retransmit_takes_no_options() {
        let text = r#"{ "protocol": "adaptive", "policy": { "kind": "alwaysRetransmit", "epsilon": 0.2 } }"#;
        assert!(serde_json::from_str::<ProtocolConfig>(text).is_err());
    }

    #[test]
    fn example_scenario_survives_json() {
        let example = Scenario::example();
        let text = example.to_json().unwrap();
        let parsed = Scenario::from_json(&text).unwrap();
        assert_eq!(parsed, example);
    }

    #[test]
    fn duplicate_hosts_are_rejected() {
        let mut scenario = Scenario::example();
        scenario.flows[1].client = scenario.flows[0].client;
        assert!(matches!(
            scenario.validate(),
            Err(ConfigError::Invalid { key: "flows", .. })
        ));
    }

    #[test]
    fn empty_flow_list_is_rejected() {
        let err = Scenario::from_json(r#"{ "flows": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "flows", .. }));
    }
}
