//! Action metadata and authentication context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::glossary::ActionId;

/// Where an action is allowed to run.
///
/// Resolved once when the action is described and stored next to its
/// metadata; evaluated per invocation by a pure placement function.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLocale {
    /// Always execute in-process.
    Local,
    /// Always delegate to the remote execution service.
    Remote,
    /// Decide from the target: services and persistent objects go remote.
    #[default]
    Auto,
}

impl ExecutionLocale {
    /// Parse a configuration value: trimmed and case-insensitive.
    ///
    /// Returns `None` for anything that is not `local`, `remote` or `auto`.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" | "locally" => Some(Self::Local),
            "remote" | "remotely" => Some(Self::Remote),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

/// Classification carried in every execute request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[default]
    User,
    Exploration,
    Debug,
}

/// Declared type information of one action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Collection-typed parameters have no identity of their own and never
    /// receive a persisted-identity assignment.
    pub collection: bool,
}

impl ParameterSpec {
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: false,
        }
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: true,
        }
    }
}

/// Metadata of one invocable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: ActionId,
    pub action_type: ActionType,
    pub locale: ExecutionLocale,
    pub parameters: Vec<ParameterSpec>,
}

impl ActionDescriptor {
    pub fn new(id: ActionId) -> Self {
        Self {
            id,
            action_type: ActionType::User,
            locale: ExecutionLocale::Auto,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_locale(mut self, locale: ExecutionLocale) -> Self {
        self.locale = locale;
        self
    }

    #[must_use]
    pub fn with_type(mut self, action_type: ActionType) -> Self {
        self.action_type = action_type;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Whether the parameter at `index` is collection-typed. Undeclared
    /// positions count as non-collection.
    #[must_use]
    pub fn parameter_is_collection(&self, index: usize) -> bool {
        self.parameters.get(index).is_some_and(|p| p.collection)
    }
}

/// Identity and credentials attached to each remote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user: String,
    pub session_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn new(user: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            session_id: session_id.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}
