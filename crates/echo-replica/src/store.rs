// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared store port and an in-process reducer-backed implementation.

use crate::action::NamespaceAction;
use crate::reducer::Reducer;
use crate::state::{Namespace, ReplicaState};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Snapshot of every namespace slice held by a store.
pub type StoreState = BTreeMap<Namespace, ReplicaState>;

/// Port for the shared application store that receives dispatched actions.
///
/// A replica calls `dispatch` with its cell unlocked, so implementations may
/// read replica state from inside it. Actions a store triggers re-entrantly
/// are sent after the current one returns.
pub trait Store: Send + Sync {
    /// Fold one action into the store.
    fn dispatch(&self, action: NamespaceAction);
    /// Current state of every namespace.
    fn get_state(&self) -> StoreState;
}

/// Error type for store registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A reducer for this namespace is already registered.
    #[error("namespace already registered: {0}")]
    DuplicateNamespace(Namespace),
    /// A namespace differing only by case is registered; both would emit
    /// the same action type names.
    #[error("namespace {requested} collides with registered namespace {registered}")]
    CollidingNamespace {
        /// Namespace already in the store.
        registered: Namespace,
        /// Namespace being registered.
        requested: Namespace,
    },
}

/// Reducer-based store holding one [`ReplicaState`] per registered namespace.
///
/// Every dispatched action is offered to every reducer; reducers ignore
/// actions addressed to other namespaces.
#[derive(Default)]
pub struct SharedStore {
    inner: Mutex<SharedStoreInner>,
}

#[derive(Default)]
struct SharedStoreInner {
    reducers: Vec<Reducer>,
    state: StoreState,
    dispatched: usize,
}

impl SharedStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace reducer and seed its initial state.
    pub fn register(&self, reducer: Reducer) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let requested = reducer.namespace();
        let prefix = requested.action_prefix();
        if let Some(existing) = inner
            .reducers
            .iter()
            .map(Reducer::namespace)
            .find(|ns| ns.action_prefix() == prefix)
        {
            if existing == requested {
                return Err(StoreError::DuplicateNamespace(requested.clone()));
            }
            return Err(StoreError::CollidingNamespace {
                registered: existing.clone(),
                requested: requested.clone(),
            });
        }
        inner
            .state
            .insert(reducer.namespace().clone(), reducer.initial_state());
        inner.reducers.push(reducer);
        Ok(())
    }

    /// State of a single namespace, if registered.
    pub fn slice(&self, namespace: &Namespace) -> Option<ReplicaState> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state.get(namespace).cloned()
    }

    /// Number of actions dispatched so far.
    pub fn dispatch_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.dispatched
    }
}

impl Store for SharedStore {
    fn dispatch(&self, action: NamespaceAction) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.dispatched += 1;
        let SharedStoreInner {
            reducers, state, ..
        } = &mut *inner;
        for reducer in reducers.iter() {
            let next = reducer.reduce(state.get(reducer.namespace()), &action);
            state.insert(reducer.namespace().clone(), next);
        }
        debug!(action = %action.action_type, "store dispatch");
    }

    fn get_state(&self) -> StoreState {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ActionTypes};
    use crate::item::LocalItem;
    use crate::state::StatePatch;

    fn ns(s: &str) -> Namespace {
        Namespace::new(s).unwrap()
    }

    #[test]
    fn register_seeds_initial_state() {
        let store = SharedStore::new();
        store.register(Reducer::new(ns("a"))).unwrap();
        assert_eq!(store.slice(&ns("a")), Some(ReplicaState::initial()));
        assert_eq!(store.slice(&ns("b")), None);
    }

    #[test]
    fn duplicate_namespace_is_rejected() {
        let store = SharedStore::new();
        store.register(Reducer::new(ns("a"))).unwrap();
        assert_eq!(
            store.register(Reducer::new(ns("a"))),
            Err(StoreError::DuplicateNamespace(ns("a")))
        );
    }

    #[test]
    fn case_only_difference_is_rejected() {
        let store = SharedStore::new();
        store.register(Reducer::new(ns("todos"))).unwrap();
        assert_eq!(
            store.register(Reducer::new(ns("TODOS"))),
            Err(StoreError::CollidingNamespace {
                registered: ns("todos"),
                requested: ns("TODOS"),
            })
        );
        assert_eq!(store.get_state().len(), 1);
        store.register(Reducer::new(ns("todos_2"))).unwrap();
    }

    #[test]
    fn dispatch_only_touches_the_addressed_slice() {
        let store = SharedStore::new();
        store.register(Reducer::new(ns("a"))).unwrap();
        store.register(Reducer::new(ns("b"))).unwrap();

        let types = ActionTypes::new(ns("a"));
        store.dispatch(NamespaceAction::new(
            &types,
            ActionKind::Value,
            Some(StatePatch::items(vec![LocalItem::new("k")])),
        ));
        store.dispatch(NamespaceAction::new(&types, ActionKind::Listen, None));

        let state = store.get_state();
        assert_eq!(state[&ns("a")].items.len(), 1);
        assert!(state[&ns("a")].listening);
        assert_eq!(state[&ns("b")], ReplicaState::initial());
        assert_eq!(store.dispatch_count(), 2);
    }
}
