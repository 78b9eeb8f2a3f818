//! Lenient key/value property parsing shared by every config struct.
//!
//! Values are trimmed and compared case-insensitively. Anything that does not
//! parse falls back to the supplied default rather than failing start-up.

use std::collections::HashMap;

use crate::action::ExecutionLocale;

/// Flat configuration properties, e.g. loaded from an environment or a file.
pub type Properties = HashMap<String, String>;

/// Read a boolean property. Only `true`/`false` (any case) are recognised.
#[must_use]
pub fn property_bool(props: &Properties, key: &str, default: bool) -> bool {
    match props.get(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" => true,
        Some(v) if v == "false" => false,
        _ => default,
    }
}

/// Read an unsigned integer property.
#[must_use]
pub fn property_usize(props: &Properties, key: &str, default: usize) -> usize {
    props
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Read an execution-locale property.
#[must_use]
pub fn property_locale(props: &Properties, key: &str, default: ExecutionLocale) -> ExecutionLocale {
    props
        .get(key)
        .and_then(|raw| ExecutionLocale::parse_lenient(raw))
        .unwrap_or(default)
}
