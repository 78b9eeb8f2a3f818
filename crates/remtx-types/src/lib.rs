//! Core types shared across the remtx workspace.

pub mod action;
pub mod config;
pub mod glossary;
pub mod object;

pub use action::{ActionDescriptor, ActionType, AuthContext, ExecutionLocale, ParameterSpec};
pub use config::{Properties, property_bool, property_locale, property_usize};
pub use glossary::{ActionId, ObjectId, TxnId, Version};
pub use object::{ActionValue, Lifecycle, ObjectHandle, ObjectKind};
