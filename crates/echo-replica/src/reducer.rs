// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pure state transition for one namespace.

use crate::action::{ActionKind, NamespaceAction};
use crate::state::{Namespace, ReplicaState};

/// Folds actions addressed to one namespace into that namespace's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reducer {
    namespace: Namespace,
}

impl Reducer {
    /// Reducer bound to `namespace`.
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    /// Namespace this reducer owns.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// State used when no prior state exists.
    pub fn initial_state(&self) -> ReplicaState {
        ReplicaState::initial()
    }

    /// Compute the next state. Never mutates `state`.
    ///
    /// | kind | effect |
    /// |---|---|
    /// | `Listen` | `listening = true` |
    /// | `Unlisten` | `listening = false` |
    /// | anything else | shallow-merge the payload |
    /// | foreign namespace | unchanged |
    pub fn reduce(&self, state: Option<&ReplicaState>, action: &NamespaceAction) -> ReplicaState {
        let current = state.cloned().unwrap_or_else(|| self.initial_state());
        if action.meta.module != self.namespace {
            return current;
        }
        match action.kind {
            ActionKind::Listen => ReplicaState {
                listening: true,
                ..current
            },
            ActionKind::Unlisten => ReplicaState {
                listening: false,
                ..current
            },
            _ => match &action.payload {
                Some(patch) => current.merged(patch),
                None => current,
            },
        }
    }
}
