//! Dispatcher configuration.

use remtx_types::{ExecutionLocale, Properties, property_bool, property_locale};
use serde::{Deserialize, Serialize};

pub const KEY_DEFAULT_LOCALE: &str = "remtx.dispatch.default_locale";
pub const KEY_LOG_PAYLOADS: &str = "remtx.dispatch.log_payloads";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Locale used for actions whose own locale is `Auto`.
    pub default_locale: ExecutionLocale,
    /// Emit request/response summaries at debug level.
    pub log_payloads: bool,
}

impl DispatchConfig {
    /// Build from flat properties; malformed values keep their defaults.
    #[must_use]
    pub fn from_properties(props: &Properties) -> Self {
        let defaults = Self::default();
        Self {
            default_locale: property_locale(props, KEY_DEFAULT_LOCALE, defaults.default_locale),
            log_payloads: property_bool(props, KEY_LOG_PAYLOADS, defaults.log_payloads),
        }
    }

    /// The locale an action declared with `declared` runs under.
    #[must_use]
    pub fn effective_locale(&self, declared: ExecutionLocale) -> ExecutionLocale {
        match declared {
            ExecutionLocale::Auto => self.default_locale,
            forced => forced,
        }
    }
}
