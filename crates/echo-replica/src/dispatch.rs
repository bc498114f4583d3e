// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Namespaced action dispatch with guarded completion callbacks.

use crate::action::{ActionKind, ActionTypes, NamespaceAction};
use crate::state::{Namespace, StatePatch};
use crate::store::Store;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Callback invoked with the dispatched payload.
pub type Completion = Box<dyn FnOnce(Option<&StatePatch>) + Send>;

/// Run a caller-supplied callback, logging instead of propagating a panic.
///
/// Returns `false` when the callback panicked.
pub(crate) fn guarded<F: FnOnce()>(what: &str, f: F) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            error!(callback = what, panic = %msg, "callback panicked; continuing");
            false
        }
    }
}

/// Wraps payloads into namespaced actions and pushes them to a store.
#[derive(Clone)]
pub struct Dispatcher {
    types: Arc<ActionTypes>,
    store: Option<Arc<dyn Store>>,
}

impl Dispatcher {
    /// Dispatcher for `types`' namespace, optionally bound to a store.
    pub fn new(types: Arc<ActionTypes>, store: Option<Arc<dyn Store>>) -> Self {
        Self { types, store }
    }

    /// Namespace stamped into `meta.module`.
    pub fn namespace(&self) -> &Namespace {
        self.types.namespace()
    }

    /// Action type names for this namespace.
    pub fn types(&self) -> &ActionTypes {
        &self.types
    }

    /// Whether a store is attached.
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Build the action for `kind` without sending it.
    pub fn action(&self, kind: ActionKind, payload: Option<StatePatch>) -> NamespaceAction {
        NamespaceAction::new(&self.types, kind, payload)
    }

    /// Send a prepared action to the store, if one is attached.
    pub fn send(&self, action: &NamespaceAction) {
        if let Some(store) = &self.store {
            debug!(action = %action.action_type, "dispatch");
            store.dispatch(action.clone());
        }
    }

    /// Send `kind` with `payload`, then run `completion(payload)`.
    ///
    /// The completion always runs, store or not. Returns the payload.
    ///
    /// Standalone entry point for callers without a local mirror, where a
    /// store is optional. [`crate::Replica`] builds with [`Self::action`] and
    /// sends with [`Self::send`] instead, since it folds each action into its
    /// own state and queues it before the store sees it.
    pub fn dispatch(
        &self,
        kind: ActionKind,
        payload: Option<StatePatch>,
        completion: Option<Completion>,
    ) -> Option<StatePatch> {
        if self.store.is_some() {
            self.send(&self.action(kind, payload.clone()));
        }
        if let Some(done) = completion {
            guarded(self.types.name(kind), || done(payload.as_ref()));
        }
        payload
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::item::LocalItem;
    use crate::reducer::Reducer;
    use crate::store::SharedStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn types(ns: &str) -> Arc<ActionTypes> {
        Arc::new(ActionTypes::new(Namespace::new(ns).unwrap()))
    }

    #[test]
    fn without_store_or_completion_returns_payload() {
        let d = Dispatcher::new(types("t"), None);
        let patch = StatePatch::items(vec![LocalItem::new("a")]);
        assert_eq!(d.dispatch(ActionKind::Added, Some(patch.clone()), None), Some(patch));
        assert!(!d.has_store());
    }

    #[test]
    fn completion_runs_without_store() {
        let d = Dispatcher::new(types("t"), None);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        d.dispatch(
            ActionKind::Value,
            Some(StatePatch::items(vec![LocalItem::new("a"), LocalItem::new("b")])),
            Some(Box::new(move |p: Option<&StatePatch>| {
                let n = p.and_then(|p| p.items.as_ref()).map_or(0, Vec::len);
                seen2.store(n, Ordering::SeqCst);
            })),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispatch_reaches_store_with_module_meta() {
        let store = Arc::new(SharedStore::new());
        let ns = Namespace::new("t").unwrap();
        store.register(Reducer::new(ns.clone())).unwrap();
        let d = Dispatcher::new(types("t"), Some(store.clone() as Arc<dyn Store>));
        d.dispatch(ActionKind::Listen, None, None);
        assert!(store.slice(&ns).unwrap().listening);
    }

    #[test]
    fn action_then_send_matches_dispatch() {
        let via_dispatch = Arc::new(SharedStore::new());
        let via_send = Arc::new(SharedStore::new());
        let ns = Namespace::new("t").unwrap();
        via_dispatch.register(Reducer::new(ns.clone())).unwrap();
        via_send.register(Reducer::new(ns.clone())).unwrap();
        let patch = Some(StatePatch::items(vec![LocalItem::new("a")]));

        Dispatcher::new(types("t"), Some(via_dispatch.clone() as Arc<dyn Store>)).dispatch(
            ActionKind::Value,
            patch.clone(),
            None,
        );
        let d = Dispatcher::new(types("t"), Some(via_send.clone() as Arc<dyn Store>));
        d.send(&d.action(ActionKind::Value, patch));
        assert_eq!(via_dispatch.get_state(), via_send.get_state());
    }

    #[test]
    fn panicking_completion_is_contained() {
        let d = Dispatcher::new(types("t"), None);
        let out = d.dispatch(
            ActionKind::Set,
            None,
            Some(Box::new(|_: Option<&StatePatch>| panic!("boom"))),
        );
        assert_eq!(out, None);
        assert!(!guarded("again", || panic!("again")));
        assert!(guarded("quiet", || {}));
    }
}
