//! Top-level runtime configuration.

use std::path::Path;

use remtx_dispatch::DispatchConfig;
use remtx_error::{RemtxError, Result};
use remtx_observability::DEFAULT_EVENT_LOG_CAPACITY;
use remtx_txn::{KEY_MAX_NESTING_DEPTH, ManagerConfig};
use remtx_types::{Properties, property_usize};
use serde::{Deserialize, Serialize};

pub const KEY_EVENT_LOG_CAPACITY: &str = "remtx.observability.event_log_capacity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Number of recent dispatch events kept for diagnostics.
    pub event_log_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub txn: ManagerConfig,
    pub dispatch: DispatchConfig,
    pub observability: ObservabilityConfig,
}

impl RuntimeConfig {
    /// Build from flat `remtx.*` properties. Malformed values fall back to
    /// their defaults; nothing here fails.
    #[must_use]
    pub fn from_properties(props: &Properties) -> Self {
        Self {
            txn: ManagerConfig::from_properties(props),
            dispatch: DispatchConfig::from_properties(props),
            observability: ObservabilityConfig {
                event_log_capacity: property_usize(
                    props,
                    KEY_EVENT_LOG_CAPACITY,
                    DEFAULT_EVENT_LOG_CAPACITY,
                ),
            },
        }
    }

    /// Load a JSON document. Missing sections take their defaults; values
    /// that are present must be valid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "runtime config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.txn.max_nesting_depth == 0 {
            return Err(RemtxError::InvalidConfig {
                key: KEY_MAX_NESTING_DEPTH.to_owned(),
                value: "0".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use remtx_dispatch::{KEY_DEFAULT_LOCALE, KEY_LOG_PAYLOADS};
    use remtx_types::ExecutionLocale;

    use super::*;

    #[test]
    fn properties_cover_every_section() {
        let mut props = Properties::new();
        props.insert(KEY_MAX_NESTING_DEPTH.into(), "8".into());
        props.insert(KEY_DEFAULT_LOCALE.into(), "LOCAL".into());
        props.insert(KEY_LOG_PAYLOADS.into(), " true".into());
        props.insert(KEY_EVENT_LOG_CAPACITY.into(), "32".into());
        let config = RuntimeConfig::from_properties(&props);
        assert_eq!(config.txn.max_nesting_depth, 8);
        assert_eq!(config.dispatch.default_locale, ExecutionLocale::Local);
        assert!(config.dispatch.log_payloads);
        assert_eq!(config.observability.event_log_capacity, 32);
    }

    #[test]
    fn empty_properties_are_defaults() {
        assert_eq!(
            RuntimeConfig::from_properties(&Properties::new()),
            RuntimeConfig::default()
        );
    }

    #[test]
    fn zero_depth_is_invalid() {
        let mut config = RuntimeConfig::default();
        config.txn.max_nesting_depth = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration value for 'remtx.txn.max_nesting_depth': 0"
        );
    }

    proptest! {
        #[test]
        fn property_loading_always_validates(
            depth in ".{0,12}",
            locale in ".{0,12}",
            capacity in ".{0,12}",
        ) {
            let mut props = Properties::new();
            props.insert(KEY_MAX_NESTING_DEPTH.into(), depth);
            props.insert(KEY_DEFAULT_LOCALE.into(), locale);
            props.insert(KEY_EVENT_LOG_CAPACITY.into(), capacity);
            let config = RuntimeConfig::from_properties(&props);
            prop_assert!(config.validate().is_ok());
            prop_assert!(config.txn.max_nesting_depth >= 1);
        }
    }
}
