//! Per-transaction message and warning accumulation.

use serde::Serialize;

/// Append-only collector of informational messages and warnings.
///
/// Owned by exactly one transaction. Entries keep insertion order and are
/// not deduplicated; the consumer (typically a UI layer) reads them once the
/// unit of work ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageSink {
    messages: Vec<String>,
    warnings: Vec<String>,
}

impl MessageSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn extend_messages<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages.extend(messages.into_iter().map(Into::into));
    }

    pub fn extend_warnings<I, S>(&mut self, warnings: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warnings.extend(warnings.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.warnings.is_empty()
    }
}
