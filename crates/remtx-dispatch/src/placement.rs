//! Local-versus-remote placement decision.

use remtx_types::ExecutionLocale;

/// What the placement decision needs to know about an instance target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFacts {
    pub is_service: bool,
    pub is_persistent: bool,
}

/// Whether an invocation must be delegated to the remote service.
///
/// First match wins: a `Local` override, a `Remote` override, a service
/// target, then the target's persistence. Without an instance target the
/// action runs locally unless the override is `Remote`.
#[must_use]
pub fn execute_remotely(locale: ExecutionLocale, target: Option<TargetFacts>) -> bool {
    match (locale, target) {
        (ExecutionLocale::Local, _) | (ExecutionLocale::Auto, None) => false,
        (ExecutionLocale::Remote, _) => true,
        (ExecutionLocale::Auto, Some(facts)) => facts.is_service || facts.is_persistent,
    }
}
