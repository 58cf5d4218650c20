//! Error types.
//!
//! The simulator has exactly one failure mode: bad configuration.  Channel
//! loss, queue overflow and give-ups are normal protocol outcomes and flow
//! through the data path as NACKs and counters, never as `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document did not parse: syntax error, missing
    /// required key, unknown key, or wrong value type.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The scenario file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A key parsed but its value is out of range.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_message_names_the_key() {
        let err = ConfigError::invalid("throughput", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid value for `throughput`: must be positive"
        );
    }

    #[test]
    fn parse_error_converts_from_serde() {
        let raw = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ConfigError = raw.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
