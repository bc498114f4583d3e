// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Listener registration, event pipeline, and point operations for one
//! namespaced replica.
//!
//! All state changes go through a single-writer cell: reconcile and fold
//! into the local mirror happen under one lock, so events for a namespace
//! apply strictly one at a time. The resulting actions queue in the cell and
//! reach the store in commit order once the lock is released, so a store may
//! read the replica from inside `dispatch`. Caller hooks run after the
//! queue is drained.

use crate::action::{ActionKind, ActionTypes, NamespaceAction};
use crate::config::{ConfigError, ReplicaConfig};
use crate::dispatch::{guarded, Completion, Dispatcher};
use crate::error::ReplicaError;
use crate::item::RemoteRecord;
use crate::ordering::{FieldOrder, Ordering};
use crate::projection::{DefaultProjection, Projection};
use crate::reconcile::{EventKind, Reconciler, ReplicaEvent};
use crate::reducer::Reducer;
use crate::remote::{EventCallback, RemoteError, RemoteOp, RemotePath, RemoteSource};
use crate::state::{Namespace, ReplicaState, StatePatch};
use crate::store::Store;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Hook observing the state after every applied change.
pub type ChangeHook = Arc<dyn Fn(&ReplicaState) + Send + Sync>;
/// Hook receiving pipeline errors when strict consistency is enabled.
pub type ErrorHook = Arc<dyn Fn(&ReplicaError) + Send + Sync>;

/// Builder for [`Replica`]; store and remote are required.
pub struct ReplicaBuilder {
    config: ReplicaConfig,
    remote: Option<Arc<dyn RemoteSource>>,
    store: Option<Arc<dyn Store>>,
    projection: Option<Arc<dyn Projection>>,
    ordering: Option<Arc<dyn Ordering>>,
    on_error: Option<ErrorHook>,
}

impl ReplicaBuilder {
    /// Start from a config.
    pub fn new(config: ReplicaConfig) -> Self {
        Self {
            config,
            remote: None,
            store: None,
            projection: None,
            ordering: None,
            on_error: None,
        }
    }

    /// Remote source to mirror.
    #[must_use]
    pub fn remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Shared store receiving dispatched actions.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the default projection.
    #[must_use]
    pub fn projection(mut self, projection: impl Projection + 'static) -> Self {
        self.projection = Some(Arc::new(projection));
        self
    }

    /// Override the default `order_by` field ordering.
    #[must_use]
    pub fn ordering(mut self, ordering: impl Ordering + 'static) -> Self {
        self.ordering = Some(Arc::new(ordering));
        self
    }

    /// Hook for consistency errors (used when `strict_consistency` is set).
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&ReplicaError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Validate and construct the replica.
    pub fn build(self) -> Result<Replica, ConfigError> {
        let (namespace, path) = self.config.validate()?;
        let store = self.store.ok_or(ConfigError::MissingStore)?;
        let remote = self.remote.ok_or(ConfigError::MissingRemote)?;
        let types = Arc::new(ActionTypes::new(namespace.clone()));
        let ordering = self
            .ordering
            .unwrap_or_else(|| Arc::new(FieldOrder::new(self.config.order_by.clone())));
        let projection = self
            .projection
            .unwrap_or_else(|| Arc::new(DefaultProjection));
        let reducer = Reducer::new(namespace.clone());
        let state = reducer.initial_state();
        Ok(Replica {
            core: Arc::new(ReplicaCore {
                namespace,
                path,
                strict: self.config.strict_consistency,
                config: self.config,
                remote,
                dispatcher: Dispatcher::new(types, Some(store)),
                reducer,
                projection,
                ordering,
                on_error: self.on_error,
                cell: Mutex::new(Cell {
                    state,
                    generation: 0,
                    active: false,
                    on_change: None,
                    outbox: VecDeque::new(),
                    draining: false,
                }),
            }),
        })
    }
}

struct Cell {
    state: ReplicaState,
    generation: u64,
    active: bool,
    on_change: Option<ChangeHook>,
    outbox: VecDeque<NamespaceAction>,
    draining: bool,
}

struct ReplicaCore {
    config: ReplicaConfig,
    namespace: Namespace,
    path: RemotePath,
    strict: bool,
    remote: Arc<dyn RemoteSource>,
    dispatcher: Dispatcher,
    reducer: Reducer,
    projection: Arc<dyn Projection>,
    ordering: Arc<dyn Ordering>,
    on_error: Option<ErrorHook>,
    cell: Mutex<Cell>,
}

impl ReplicaCore {
    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.projection.as_ref(), self.ordering.as_ref())
    }

    // Caller holds the cell lock and must `drain` after releasing it.
    fn commit(
        &self,
        cell: &mut Cell,
        kind: ActionKind,
        payload: Option<StatePatch>,
    ) -> ReplicaState {
        let action = self.dispatcher.action(kind, payload);
        cell.state = self.reducer.reduce(Some(&cell.state), &action);
        cell.outbox.push_back(action);
        cell.state.clone()
    }

    // Send queued actions in commit order with the cell unlocked. One thread
    // drains at a time; the others leave their actions to it.
    fn drain(&self) {
        {
            let mut cell = self.lock();
            if cell.draining {
                return;
            }
            cell.draining = true;
        }
        loop {
            let next = {
                let mut cell = self.lock();
                let next = cell.outbox.pop_front();
                if next.is_none() {
                    cell.draining = false;
                }
                next
            };
            let Some(action) = next else {
                break;
            };
            guarded("store dispatch", || self.dispatcher.send(&action));
        }
    }

    fn notify(hook: Option<ChangeHook>, state: &ReplicaState) {
        if let Some(hook) = hook {
            guarded("on_change", || hook(state));
        }
    }

    fn on_event(&self, generation: u64, event: ReplicaEvent) {
        let outcome = {
            let mut cell = self.lock();
            if !cell.active || cell.generation != generation {
                debug!(
                    namespace = %self.namespace,
                    key = %event.record.key,
                    "dropping event from inactive subscription"
                );
                return;
            }
            match self.reconciler().apply(&cell.state, &event) {
                Ok(items) => {
                    let state =
                        self.commit(&mut cell, event.kind.action(), Some(StatePatch::items(items)));
                    Ok((cell.on_change.clone(), state))
                }
                Err(err) => Err(err),
            }
        };
        self.drain();
        match outcome {
            Ok((hook, state)) => {
                debug!(
                    namespace = %self.namespace,
                    event = event.kind.as_str(),
                    key = %event.record.key,
                    items = state.items.len(),
                    "event applied"
                );
                Self::notify(hook, &state);
            }
            Err(err) => {
                warn!(namespace = %self.namespace, error = %err, "skipping inconsistent event");
                if self.strict {
                    if let Some(hook) = &self.on_error {
                        let err = ReplicaError::from(err);
                        guarded("on_error", || hook(&err));
                    }
                }
            }
        }
    }

    fn event_callback(self: &Arc<Self>, generation: u64, kind: EventKind) -> EventCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |record: RemoteRecord| {
            if let Some(core) = weak.upgrade() {
                core.on_event(generation, ReplicaEvent { kind, record });
            }
        })
    }

    // Dispatch the outcome of a point operation and run the caller callback
    // on success. Failures dispatch with a null payload.
    fn finish<T>(
        &self,
        kind: ActionKind,
        outcome: Result<T, ReplicaError>,
        payload: impl FnOnce(&T) -> Option<StatePatch>,
        callback: Option<Completion>,
    ) -> Result<T, ReplicaError> {
        let patch = outcome.as_ref().ok().and_then(payload);
        {
            let mut cell = self.lock();
            self.commit(&mut cell, kind, patch.clone());
        }
        self.drain();
        match outcome {
            Ok(value) => {
                if let Some(done) = callback {
                    guarded(self.dispatcher.types().name(kind), || done(patch.as_ref()));
                }
                Ok(value)
            }
            Err(err) => {
                warn!(namespace = %self.namespace, error = %err, "point operation failed");
                Err(err)
            }
        }
    }
}

// Bridge a continuation-style remote call into a future.
async fn round_trip<T, F>(op: RemoteOp, path: &RemotePath, start: F) -> Result<T, ReplicaError>
where
    T: Send + 'static,
    F: FnOnce(Box<dyn FnOnce(Result<T, RemoteError>) + Send>),
{
    let (tx, rx) = oneshot::channel::<Result<T, RemoteError>>();
    start(Box::new(move |res: Result<T, RemoteError>| {
        let _ = tx.send(res);
    }));
    match rx.await {
        Ok(res) => res.map_err(ReplicaError::from),
        Err(_) => Err(ReplicaError::Cancelled {
            op,
            path: path.clone(),
        }),
    }
}

fn children(value: Option<Value>) -> Vec<RemoteRecord> {
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| RemoteRecord::new(key, value))
            .collect(),
        _ => Vec::new(),
    }
}

/// Ordered local mirror of one remote collection, bound to a namespace.
///
/// Cheap to clone; clones share the same single-writer cell.
#[derive(Clone)]
pub struct Replica {
    core: Arc<ReplicaCore>,
}

impl Replica {
    /// Start building a replica from `config`.
    pub fn builder(config: ReplicaConfig) -> ReplicaBuilder {
        ReplicaBuilder::new(config)
    }

    /// Namespace of this replica.
    pub fn namespace(&self) -> &Namespace {
        &self.core.namespace
    }

    /// Collection path being mirrored.
    pub fn path(&self) -> &RemotePath {
        &self.core.path
    }

    /// Config the replica was built from.
    pub fn config(&self) -> &ReplicaConfig {
        &self.core.config
    }

    /// Action type names for this namespace.
    pub fn types(&self) -> &ActionTypes {
        self.core.dispatcher.types()
    }

    /// Reducer to register with the shared store.
    pub fn reducer(&self) -> &Reducer {
        &self.core.reducer
    }

    /// Initial state value of the namespace slice.
    pub fn initial_state(&self) -> ReplicaState {
        self.core.reducer.initial_state()
    }

    /// Current local mirror of the namespace slice.
    pub fn state(&self) -> ReplicaState {
        self.core.lock().state.clone()
    }

    /// Whether subscriptions are registered.
    pub fn is_listening(&self) -> bool {
        self.core.lock().active
    }

    /// Subscribe to child events and dispatch `LISTEN` once registered.
    ///
    /// `on_change` sees the state after every applied event. Calling this
    /// while already listening returns the current state and keeps the
    /// existing hook. If `unlisten` runs before registration finishes, no
    /// `LISTEN` is dispatched and the not-listening state is returned.
    pub fn listen(
        &self,
        on_change: impl Fn(&ReplicaState) + Send + Sync + 'static,
    ) -> Result<ReplicaState, ReplicaError> {
        let core = &self.core;
        let generation = {
            let mut cell = core.lock();
            if cell.active {
                debug!(namespace = %core.namespace, "already listening");
                return Ok(cell.state.clone());
            }
            cell.generation += 1;
            cell.active = true;
            cell.on_change = Some(Arc::new(on_change));
            cell.generation
        };

        for kind in EventKind::ALL {
            let callback = core.event_callback(generation, kind);
            if let Err(err) = core.remote.subscribe(&core.path, kind, callback) {
                core.remote.unsubscribe(&core.path);
                let mut cell = core.lock();
                if cell.generation == generation {
                    cell.active = false;
                    cell.on_change = None;
                }
                warn!(namespace = %core.namespace, error = %err, "subscription failed");
                return Err(err.into());
            }
        }

        let committed = {
            let mut cell = core.lock();
            if cell.generation == generation {
                Some(core.commit(&mut cell, ActionKind::Listen, None))
            } else {
                None
            }
        };
        let Some(state) = committed else {
            // unlisten ran while subscribing; drop what it could not see
            return Ok(self.abandon_listen());
        };
        core.drain();
        info!(namespace = %core.namespace, path = %core.path, "listening");
        Ok(state)
    }

    fn abandon_listen(&self) -> ReplicaState {
        let core = &self.core;
        let still_inactive = !core.lock().active;
        if still_inactive {
            core.remote.unsubscribe(&core.path);
        }
        debug!(namespace = %core.namespace, "listen superseded while subscribing");
        self.state()
    }

    /// Unsubscribe and dispatch `UNLISTEN`. Events still in flight from the
    /// old subscription are ignored; pending point operations are not.
    pub fn unlisten(&self) -> ReplicaState {
        let core = &self.core;
        {
            let mut cell = core.lock();
            cell.active = false;
            cell.generation += 1;
            cell.on_change = None;
        }
        core.remote.unsubscribe(&core.path);
        let state = {
            let mut cell = core.lock();
            core.commit(&mut cell, ActionKind::Unlisten, None)
        };
        core.drain();
        info!(namespace = %core.namespace, "stopped listening");
        state
    }

    /// Read the value at `path` (relative to the collection) and dispatch `GET`.
    #[instrument(skip_all, fields(namespace = %self.core.namespace, path = path))]
    pub async fn get_at(
        &self,
        path: &str,
        callback: Option<Completion>,
    ) -> Result<Option<Value>, ReplicaError> {
        let core = &self.core;
        let target = core.path.child(path);
        let outcome = round_trip(RemoteOp::Read, &target, |done| {
            core.remote.once(&target, done);
        })
        .await;
        core.finish(
            ActionKind::Get,
            outcome,
            |value| Some(StatePatch::value(value.clone().unwrap_or(Value::Null))),
            callback,
        )
    }

    /// Overwrite the value at `path` and dispatch `SET`.
    #[instrument(skip_all, fields(namespace = %self.core.namespace, path = path))]
    pub async fn set_at(
        &self,
        path: &str,
        value: Value,
        callback: Option<Completion>,
    ) -> Result<(), ReplicaError> {
        let core = &self.core;
        let target = core.path.child(path);
        let written = value.clone();
        let outcome = round_trip(RemoteOp::Write, &target, |done| {
            core.remote.write(&target, value, done);
        })
        .await;
        core.finish(
            ActionKind::Set,
            outcome,
            move |_| Some(StatePatch::value(written)),
            callback,
        )
    }

    /// Shallow-merge `value` into `path` and dispatch `UPDATE`.
    #[instrument(skip_all, fields(namespace = %self.core.namespace, path = path))]
    pub async fn update_at(
        &self,
        path: &str,
        value: Value,
        callback: Option<Completion>,
    ) -> Result<(), ReplicaError> {
        let core = &self.core;
        let target = core.path.child(path);
        let merged = value.clone();
        let outcome = round_trip(RemoteOp::Merge, &target, |done| {
            core.remote.merge(&target, value, done);
        })
        .await;
        core.finish(
            ActionKind::Update,
            outcome,
            move |_| Some(StatePatch::value(merged)),
            callback,
        )
    }

    /// Delete the value at `path` and dispatch `REMOVE`.
    #[instrument(skip_all, fields(namespace = %self.core.namespace, path = path))]
    pub async fn remove_at(
        &self,
        path: &str,
        callback: Option<Completion>,
    ) -> Result<(), ReplicaError> {
        let core = &self.core;
        let target = core.path.child(path);
        let outcome = round_trip(RemoteOp::Delete, &target, |done| {
            core.remote.delete(&target, done);
        })
        .await;
        core.finish(ActionKind::Remove, outcome, |_| None, callback)
    }

    /// Load the whole collection once and dispatch it as a `VALUE` snapshot,
    /// replacing the item list.
    #[instrument(skip_all, fields(namespace = %self.core.namespace))]
    pub async fn refresh(&self) -> Result<ReplicaState, ReplicaError> {
        let core = &self.core;
        let outcome = round_trip(RemoteOp::Read, &core.path, |done| {
            core.remote.once(&core.path, done);
        })
        .await;
        match outcome {
            Ok(value) => {
                let records = children(value);
                let (hook, state) = {
                    let mut cell = core.lock();
                    let items = core.reconciler().snapshot(&cell.state, &records);
                    let state =
                        core.commit(&mut cell, ActionKind::Value, Some(StatePatch::items(items)));
                    (cell.on_change.clone(), state)
                };
                core.drain();
                debug!(items = state.items.len(), "snapshot loaded");
                ReplicaCore::notify(hook, &state);
                Ok(state)
            }
            Err(err) => {
                {
                    let mut cell = core.lock();
                    core.commit(&mut cell, ActionKind::Value, None);
                }
                core.drain();
                warn!(error = %err, "snapshot read failed");
                Err(err)
            }
        }
    }

    /// Dispatch `UPDATED` with a caller-supplied patch.
    pub fn patch(&self, patch: StatePatch) -> ReplicaState {
        let core = &self.core;
        let (hook, state) = {
            let mut cell = core.lock();
            let state = core.commit(&mut cell, ActionKind::Updated, Some(patch));
            (cell.on_change.clone(), state)
        };
        core.drain();
        ReplicaCore::notify(hook, &state);
        state
    }
}
