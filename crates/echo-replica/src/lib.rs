// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered local replica of a remote collection.
#![forbid(unsafe_code)]
//!
//! A [`Replica`] subscribes to `child_added` / `child_removed` /
//! `child_changed` events from a [`RemoteSource`], reconciles each event into
//! a sorted item list, and pushes the new state as a namespaced action into a
//! shared [`Store`]. Each namespace owns one slice of the store; its
//! [`Reducer`] ignores actions addressed to other namespaces.
//!
//! ```text
//! remote event → Projection → Reconciler → Dispatcher → Store/Reducer → hook
//! ```
//!
//! # Modules
//!
//! - [`action`] - action kinds, per-namespace type names, namespaced actions
//! - [`config`] - replica configuration and configuration errors
//! - [`dispatch`] - action dispatch with guarded completions
//! - [`item`] - remote records and local items
//! - [`ordering`] - item ordering (default: `timestamp` ascending)
//! - [`projection`] - record → item conversion
//! - [`reconcile`] - event application over the sorted list
//! - [`reducer`] - pure per-namespace state transitions
//! - [`remote`] - remote source port
//! - [`replica`] - listener registration and point operations
//! - [`state`] - namespace, replica state, state patches
//! - [`store`] - shared store port and in-process implementation

pub mod action;
pub mod config;
pub mod dispatch;
mod error;
pub mod item;
pub mod ordering;
pub mod projection;
pub mod reconcile;
pub mod reducer;
pub mod remote;
pub mod replica;
pub mod state;
pub mod store;

pub use action::{ActionKind, ActionMeta, ActionTypes, NamespaceAction};
pub use config::{ConfigError, ReplicaConfig};
pub use dispatch::{Completion, Dispatcher};
pub use error::ReplicaError;
pub use item::{ItemKey, LocalItem, RemoteRecord};
pub use ordering::{FieldOrder, Ordering};
pub use projection::{DefaultProjection, Projection};
pub use reconcile::{ConsistencyError, EventKind, Reconciler, ReplicaEvent};
pub use reducer::Reducer;
pub use remote::{
    EventCallback, ReadDone, RemoteError, RemoteOp, RemotePath, RemoteSource, WriteDone,
};
pub use replica::{ChangeHook, ErrorHook, Replica, ReplicaBuilder};
pub use state::{Namespace, ReplicaState, StatePatch};
pub use store::{SharedStore, Store, StoreError, StoreState};
