// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Action kinds and the namespaced actions sent to the shared store.

use crate::state::{Namespace, StatePatch};
use serde::{Deserialize, Serialize};

/// Fixed set of action kinds every namespace understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Subscriptions registered.
    Listen,
    /// Subscriptions dropped.
    Unlisten,
    /// Point delete finished.
    Remove,
    /// Point merge finished.
    Update,
    /// Point write finished.
    Set,
    /// Point read finished.
    Get,
    /// Full collection snapshot loaded.
    Value,
    /// Item added by a remote event.
    Added,
    /// Item removed by a remote event.
    Removed,
    /// Item changed by a remote event.
    Changed,
    /// Caller-supplied state patch.
    Updated,
}

impl ActionKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Listen,
        Self::Unlisten,
        Self::Remove,
        Self::Update,
        Self::Set,
        Self::Get,
        Self::Value,
        Self::Added,
        Self::Removed,
        Self::Changed,
        Self::Updated,
    ];

    /// Uppercase suffix used in action type names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listen => "LISTEN",
            Self::Unlisten => "UNLISTEN",
            Self::Remove => "REMOVE",
            Self::Update => "UPDATE",
            Self::Set => "SET",
            Self::Get => "GET",
            Self::Value => "VALUE",
            Self::Added => "ADDED",
            Self::Removed => "REMOVED",
            Self::Changed => "CHANGED",
            Self::Updated => "UPDATED",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Action type names for one namespace, generated once and immutable after.
///
/// Names have the form `NAMESPACE/KIND`, namespace uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTypes {
    namespace: Namespace,
    names: [String; 11],
}

impl ActionTypes {
    /// Generate the type names for `namespace`.
    pub fn new(namespace: Namespace) -> Self {
        let prefix = namespace.action_prefix();
        let names = ActionKind::ALL.map(|kind| format!("{prefix}/{}", kind.as_str()));
        Self { namespace, names }
    }

    /// Namespace these names belong to.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Full type name for `kind`.
    pub fn name(&self, kind: ActionKind) -> &str {
        &self.names[kind.index()]
    }

    /// Reverse lookup of a full type name.
    pub fn kind_of(&self, name: &str) -> Option<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| self.names[kind.index()] == name)
    }

    /// `(kind, name)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, &str)> + '_ {
        ActionKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.name(kind)))
    }
}

/// Routing metadata attached to every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    /// Namespace that emitted the action.
    pub module: Namespace,
}

/// Unit of state change delivered to the shared store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceAction {
    /// Enumerated kind.
    pub kind: ActionKind,
    /// Namespace-prefixed type name (e.g. `TODOS/ADDED`).
    #[serde(rename = "type")]
    pub action_type: String,
    /// Partial state to merge, if any.
    pub payload: Option<StatePatch>,
    /// Routing metadata.
    pub meta: ActionMeta,
}

impl NamespaceAction {
    /// Build an action for the namespace owning `types`.
    pub fn new(types: &ActionTypes, kind: ActionKind, payload: Option<StatePatch>) -> Self {
        Self {
            kind,
            action_type: types.name(kind).to_owned(),
            payload,
            meta: ActionMeta {
                module: types.namespace().clone(),
            },
        }
    }
}
