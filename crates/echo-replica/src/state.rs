// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-namespace replica state and the partial patches folded into it.

use crate::config::ConfigError;
use crate::item::LocalItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier scoping one replica's actions and state slice within a store.
///
/// Non-empty, ASCII alphanumerics plus `_` and `-`. `/` is reserved as the
/// separator between namespace and action kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ConfigError::MissingNamespace);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidNamespace(raw));
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uppercase prefix of this namespace's action type names.
    ///
    /// Namespaces differing only by ASCII case share a prefix and cannot
    /// coexist in one store.
    pub fn action_prefix(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Local state held for one namespace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplicaState {
    /// Items sorted by the replica's ordering.
    pub items: Vec<LocalItem>,
    /// Whether event subscriptions are active.
    pub listening: bool,
    /// Most recent value produced by a point operation. Never feeds `items`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ReplicaState {
    /// Fresh state: no items, not listening.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Shallow-merge a patch, producing a new state.
    #[must_use]
    pub fn merged(&self, patch: &StatePatch) -> Self {
        Self {
            items: patch.items.clone().unwrap_or_else(|| self.items.clone()),
            listening: patch.listening.unwrap_or(self.listening),
            value: match &patch.value {
                Some(v) => Some(v.clone()),
                None => self.value.clone(),
            },
        }
    }

    /// Position of the item with `key`, if present.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key == key)
    }
}

/// Partial [`ReplicaState`]; absent fields are left untouched on merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatePatch {
    /// Replacement item list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LocalItem>>,
    /// Replacement listening flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening: Option<bool>,
    /// Replacement point-operation value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl StatePatch {
    /// Patch replacing only the item list.
    pub fn items(items: Vec<LocalItem>) -> Self {
        Self {
            items: Some(items),
            ..Self::default()
        }
    }

    /// Patch replacing only the point-operation value.
    pub fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }
}
